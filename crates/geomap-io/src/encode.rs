use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use thiserror::Error;

use geomap_core::ConfigError;
use geomap_renderer::{CompositeOutcome, Map};

use crate::request::{MapRequest, RequestError, PNG_FORMAT};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid saved view: {0}")]
    InvalidState(#[from] ConfigError),

    #[error("Composite skipped: another render is in flight")]
    Busy,
}

/// Failure of a full request-to-image round.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// An encoded raster with its MIME type, ready to hand to an HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

pub fn encode_png(image: &RgbaImage) -> Result<EncodedImage, EncodeError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(EncodedImage {
        bytes,
        mime: PNG_FORMAT,
    })
}

/// Composite `map` once and encode the result as PNG.
pub fn render_response(map: &mut Map) -> Result<EncodedImage, EncodeError> {
    let result = match map.composite() {
        CompositeOutcome::Rendered(result) => result,
        CompositeOutcome::Skipped => return Err(EncodeError::Busy),
    };
    if let Some(fault) = &result.transform_fault {
        log::warn!("Serving untransformed image: {fault}");
    }
    let encoded = encode_png(&result.image)?;
    log::info!(
        "Encoded {}x{} map as {} bytes of {}",
        result.image.width(),
        result.image.height(),
        encoded.bytes.len(),
        encoded.mime
    );
    Ok(encoded)
}

/// Parse request pairs, point `map` at them, and render.
pub fn handle_get_map<I, K, V>(map: &mut Map, pairs: I) -> Result<EncodedImage, ServeError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let request = MapRequest::from_pairs(pairs)?;
    request.apply_to(map)?;
    Ok(render_response(map)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomap_core::Envelope;
    use geomap_renderer::FeatureLayer;

    fn decode(encoded: &EncodedImage) -> RgbaImage {
        image::load_from_memory_with_format(&encoded.bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8()
    }

    #[test]
    fn test_png_round_trip_keeps_pixels() {
        let mut map = Map::new(6, 4).unwrap();
        let encoded = render_response(&mut map).unwrap();
        assert_eq!(encoded.mime, "image/png");
        assert_eq!(&encoded.bytes[1..4], b"PNG");
        let decoded = decode(&encoded);
        assert_eq!(decoded.dimensions(), (6, 4));
        assert!(decoded.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn test_handle_get_map() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut map = Map::new(1, 1).unwrap();
        map.layers_mut().add_leaf(
            "land",
            FeatureLayer::new().with_rect(Envelope::new(0.0, 0.0, 10.0, 10.0), [0, 128, 0, 255]),
        );
        let encoded = handle_get_map(
            &mut map,
            [
                ("WIDTH", "10"),
                ("HEIGHT", "10"),
                ("BBOX", "0,0,20,20"),
                ("BGCOLOR", "0x0000FF"),
                ("LAYERS", "land"),
            ],
        )
        .unwrap();
        let decoded = decode(&encoded);
        assert_eq!(decoded.get_pixel(0, 9).0, [0, 128, 0, 255]);
        assert_eq!(decoded.get_pixel(9, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_handle_get_map_reports_request_errors() {
        let mut map = Map::new(1, 1).unwrap();
        let err = handle_get_map(&mut map, [("WIDTH", "10")]).unwrap_err();
        assert!(matches!(err, ServeError::Request(RequestError::Missing("HEIGHT"))));
    }
}
