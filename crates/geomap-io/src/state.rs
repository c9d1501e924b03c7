//! JSON persistence for view state and map settings.

use geomap_core::{ViewState, Viewport};
use geomap_renderer::MapSettings;

use crate::encode::EncodeError;

pub fn view_state_to_json(state: &ViewState) -> Result<String, EncodeError> {
    Ok(serde_json::to_string_pretty(state)?)
}

pub fn view_state_from_json(json: &str) -> Result<ViewState, EncodeError> {
    Ok(serde_json::from_str(json)?)
}

/// Restore a viewport saved with [`view_state_to_json`].
pub fn viewport_from_json(json: &str) -> Result<Viewport, EncodeError> {
    let state = view_state_from_json(json)?;
    Ok(Viewport::from_state(&state)?)
}

/// Missing keys take their defaults; values are validated when applied to a
/// map, not here.
pub fn settings_from_json(json: &str) -> Result<MapSettings, EncodeError> {
    Ok(serde_json::from_str(json)?)
}

pub fn settings_to_json(settings: &MapSettings) -> Result<String, EncodeError> {
    Ok(serde_json::to_string_pretty(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomap_core::{ConfigError, Envelope, Point};

    #[test]
    fn test_view_state_restores_framing() {
        let mut viewport = Viewport::new(300, 150).unwrap();
        viewport.zoom_to_fit(&Envelope::new(-10.0, -5.0, 30.0, 15.0), false);
        let json = view_state_to_json(&viewport.state()).unwrap();
        assert!(json.contains("\"center_x\""));

        let restored = viewport_from_json(&json).unwrap();
        assert_eq!(restored.size(), (300, 150));
        assert_eq!(restored.center(), Point::new(10.0, 5.0));
        assert!((restored.zoom() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_size_state_rejected() {
        let json = r#"{"center_x":0,"center_y":0,"zoom":1,"width":0,"height":5}"#;
        assert!(matches!(
            viewport_from_json(json),
            Err(EncodeError::InvalidState(ConfigError::InvalidSize { .. }))
        ));
    }

    #[test]
    fn test_settings_defaults_fill_missing_keys() {
        let settings = settings_from_json(r#"{"background":[0,0,0,0],"maximum_zoom":500.0}"#).unwrap();
        assert_eq!(settings.background, [0, 0, 0, 0]);
        assert_eq!(settings.maximum_zoom, 500.0);
        assert_eq!(settings.fast_render_threshold_ms, MapSettings::default().fast_render_threshold_ms);

        let json = settings_to_json(&settings).unwrap();
        assert_eq!(settings_from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(view_state_from_json("{"), Err(EncodeError::Json(_))));
    }
}
