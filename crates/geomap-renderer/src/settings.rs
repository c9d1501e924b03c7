use serde::{Deserialize, Serialize};

use geomap_core::viewport::DEFAULT_FIT_MARGIN;
use geomap_core::{ConfigError, Viewport};

/// Tunables applied to a [`crate::Map`] and its compositor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// RGBA colour the canvas is cleared to before layers are painted.
    pub background: [u8; 4],
    /// Layers that rendered faster than this drop their cached raster after
    /// compositing.
    pub fast_render_threshold_ms: f64,
    /// Fraction of the box size added around margin fits.
    pub fit_margin: f64,
    pub pixel_aspect_ratio: f64,
    pub minimum_zoom: f64,
    pub maximum_zoom: f64,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            background: [255, 255, 255, 255],
            fast_render_threshold_ms: 50.0,
            fit_margin: DEFAULT_FIT_MARGIN,
            pixel_aspect_ratio: 1.0,
            minimum_zoom: 0.0,
            maximum_zoom: f64::MAX,
        }
    }
}

impl MapSettings {
    /// Push the view-related settings into `viewport`.
    pub fn apply_to(&self, viewport: &mut Viewport) -> Result<(), ConfigError> {
        viewport.set_zoom_bounds(self.minimum_zoom, self.maximum_zoom)?;
        viewport.set_pixel_aspect_ratio(self.pixel_aspect_ratio)?;
        viewport.set_fit_margin(self.fit_margin)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_cleanly() {
        let mut viewport = Viewport::new(10, 10).unwrap();
        MapSettings::default().apply_to(&mut viewport).unwrap();
        assert_eq!(viewport.fit_margin(), DEFAULT_FIT_MARGIN);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut viewport = Viewport::new(10, 10).unwrap();
        let settings = MapSettings {
            minimum_zoom: 5.0,
            maximum_zoom: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.apply_to(&mut viewport),
            Err(ConfigError::InvertedZoomBounds { .. })
        ));
    }
}
