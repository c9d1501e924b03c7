//! GetMap-style request parameters.
//!
//! A request names the output size, the area to show (either a `BBOX` or a
//! `CENTER` with a `ZOOM`), and optionally the SRS, background colour, and
//! the layers to include. Keys are matched case-insensitively.

use thiserror::Error;

use geomap_core::{ConfigError, Envelope, LayerError, LayerId, LayerTree, Point, Viewport};
use geomap_renderer::Map;

/// The only output format this crate encodes.
pub const PNG_FORMAT: &str = "image/png";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Missing required parameter {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for parameter {param}")]
    InvalidValue { param: &'static str, value: String },

    #[error("Invalid BBOX '{0}': expected minx,miny,maxx,maxy with non-zero area")]
    InvalidBbox(String),

    #[error("Unsupported format '{0}'")]
    UnsupportedFormat(String),

    #[error("Unknown layer '{0}'")]
    UnknownLayer(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Layer(#[from] LayerError),
}

/// Which area of the world a request asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewRequest {
    Bbox(Envelope),
    Center { center: Point, zoom: f64 },
}

/// A parsed map request.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRequest {
    pub width: u32,
    pub height: u32,
    pub view: ViewRequest,
    pub srs: Option<String>,
    /// RGBA, opaque; from `BGCOLOR=0xRRGGBB`.
    pub background: Option<[u8; 4]>,
    /// Names of the layers to show; `None` leaves visibility untouched.
    pub layers: Option<Vec<String>>,
}

#[derive(Default)]
struct RawParams {
    width: Option<String>,
    height: Option<String>,
    format: Option<String>,
    bbox: Option<String>,
    center: Option<String>,
    zoom: Option<String>,
    srs: Option<String>,
    bgcolor: Option<String>,
    layers: Option<String>,
}

impl MapRequest {
    /// Parse `(key, value)` query pairs. Unrecognised keys are ignored; when
    /// a key repeats the last value wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut raw = RawParams::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim().to_string();
            let slot = match key.as_ref().to_ascii_uppercase().as_str() {
                "WIDTH" => &mut raw.width,
                "HEIGHT" => &mut raw.height,
                "FORMAT" => &mut raw.format,
                "BBOX" => &mut raw.bbox,
                "CENTER" => &mut raw.center,
                "ZOOM" => &mut raw.zoom,
                "SRS" | "CRS" => &mut raw.srs,
                "BGCOLOR" => &mut raw.bgcolor,
                "LAYERS" => &mut raw.layers,
                other => {
                    log::debug!("Ignoring request parameter {other}");
                    continue;
                }
            };
            *slot = Some(value);
        }

        let width = parse_dimension("WIDTH", raw.width)?;
        let height = parse_dimension("HEIGHT", raw.height)?;

        if let Some(format) = raw.format {
            if !format.eq_ignore_ascii_case(PNG_FORMAT) {
                return Err(RequestError::UnsupportedFormat(format));
            }
        }

        let view = match (raw.bbox, raw.center) {
            (Some(bbox), _) => ViewRequest::Bbox(parse_bbox(&bbox)?),
            (None, Some(center)) => {
                let zoom = raw.zoom.ok_or(RequestError::Missing("ZOOM"))?;
                ViewRequest::Center {
                    center: parse_center(&center)?,
                    zoom: parse_zoom(&zoom)?,
                }
            }
            (None, None) => return Err(RequestError::Missing("BBOX")),
        };

        let background = raw.bgcolor.as_deref().map(parse_bgcolor).transpose()?;
        let layers = raw.layers.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        });

        Ok(Self {
            width,
            height,
            view,
            srs: raw.srs.filter(|s| !s.is_empty()),
            background,
            layers,
        })
    }

    /// Build a standalone viewport for this request.
    pub fn viewport(&self) -> Result<Viewport, RequestError> {
        let mut viewport = Viewport::new(self.width, self.height)?;
        match self.view {
            ViewRequest::Bbox(bbox) => {
                viewport.zoom_to_fit(&bbox, false);
            }
            ViewRequest::Center { center, zoom } => {
                viewport.set_center(center);
                viewport.set_zoom(zoom);
            }
        }
        viewport.set_srs_identifier(self.srs.clone());
        Ok(viewport)
    }

    /// Point `map` at this request: size, view, SRS, background, and layer
    /// selection. Unknown layer names are rejected before anything changes.
    pub fn apply_to(&self, map: &mut Map) -> Result<(), RequestError> {
        let selected = match &self.layers {
            Some(names) => Some(resolve_layers(map.layers(), names)?),
            None => None,
        };

        if let Some(background) = self.background {
            let mut settings = map.settings().clone();
            settings.background = background;
            map.apply_settings(settings)?;
        }

        map.set_size(self.width, self.height)?;
        match self.view {
            ViewRequest::Bbox(bbox) => {
                map.zoom_to_fit(&bbox, false);
            }
            ViewRequest::Center { center, zoom } => {
                map.set_center(center);
                map.set_zoom(zoom);
            }
        }
        if self.srs.as_deref() != map.viewport().srs_identifier() {
            map.set_srs_identifier(self.srs.clone());
        }

        if let Some(ids) = selected {
            let tree = map.layers_mut();
            tree.set_all_visible(false);
            for id in ids {
                show_with_ancestors(tree, id)?;
            }
        }
        Ok(())
    }
}

fn parse_dimension(param: &'static str, value: Option<String>) -> Result<u32, RequestError> {
    let value = value.ok_or(RequestError::Missing(param))?;
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(RequestError::InvalidValue { param, value }),
    }
}

fn parse_numbers(s: &str) -> Option<Vec<f64>> {
    s.split(',')
        .map(|part| part.trim().parse::<f64>().ok().filter(|n| n.is_finite()))
        .collect()
}

fn parse_bbox(s: &str) -> Result<Envelope, RequestError> {
    let invalid = || RequestError::InvalidBbox(s.to_string());
    let parts = parse_numbers(s).ok_or_else(invalid)?;
    let &[min_x, min_y, max_x, max_y] = parts.as_slice() else {
        return Err(invalid());
    };
    if min_x >= max_x || min_y >= max_y {
        return Err(invalid());
    }
    Ok(Envelope::new(min_x, min_y, max_x, max_y))
}

fn parse_center(s: &str) -> Result<Point, RequestError> {
    let invalid = || RequestError::InvalidValue {
        param: "CENTER",
        value: s.to_string(),
    };
    let parts = parse_numbers(s).ok_or_else(invalid)?;
    let &[x, y] = parts.as_slice() else {
        return Err(invalid());
    };
    Ok(Point::new(x, y))
}

fn parse_zoom(s: &str) -> Result<f64, RequestError> {
    match s.parse::<f64>() {
        Ok(zoom) if zoom > 0.0 && zoom.is_finite() => Ok(zoom),
        _ => Err(RequestError::InvalidValue {
            param: "ZOOM",
            value: s.to_string(),
        }),
    }
}

fn parse_bgcolor(s: &str) -> Result<[u8; 4], RequestError> {
    let invalid = || RequestError::InvalidValue {
        param: "BGCOLOR",
        value: s.to_string(),
    };
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('#'))
        .unwrap_or(s);
    if hex.len() != 6 {
        return Err(invalid());
    }
    let rgb = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
    let [_, r, g, b] = rgb.to_be_bytes();
    Ok([r, g, b, 255])
}

fn resolve_layers(tree: &LayerTree, names: &[String]) -> Result<Vec<LayerId>, RequestError> {
    names
        .iter()
        .map(|name| {
            tree.find_by_name(name)
                .ok_or_else(|| RequestError::UnknownLayer(name.clone()))
        })
        .collect()
}

/// A layer only draws when every enclosing group is visible too.
fn show_with_ancestors(tree: &mut LayerTree, id: LayerId) -> Result<(), LayerError> {
    let mut current = Some(id);
    while let Some(layer_id) = current {
        tree.set_visible(layer_id, true)?;
        current = tree.layer(layer_id)?.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomap_renderer::FeatureLayer;

    fn parse(pairs: &[(&str, &str)]) -> Result<MapRequest, RequestError> {
        MapRequest::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_parse_bbox_request() {
        let request = parse(&[
            ("width", "200"),
            ("HEIGHT", "100"),
            ("Format", "image/png"),
            ("BBOX", "0,0,20,10"),
            ("srs", "EPSG:3857"),
            ("BGCOLOR", "0x102030"),
            ("LAYERS", "roads, rivers"),
        ])
        .unwrap();
        assert_eq!((request.width, request.height), (200, 100));
        assert_eq!(request.view, ViewRequest::Bbox(Envelope::new(0.0, 0.0, 20.0, 10.0)));
        assert_eq!(request.srs.as_deref(), Some("EPSG:3857"));
        assert_eq!(request.background, Some([0x10, 0x20, 0x30, 255]));
        assert_eq!(
            request.layers,
            Some(vec!["roads".to_string(), "rivers".to_string()])
        );
    }

    #[test]
    fn test_parse_center_request() {
        let request = parse(&[
            ("WIDTH", "10"),
            ("HEIGHT", "10"),
            ("CENTER", "5.5,-3"),
            ("ZOOM", "40"),
        ])
        .unwrap();
        assert_eq!(
            request.view,
            ViewRequest::Center {
                center: Point::new(5.5, -3.0),
                zoom: 40.0
            }
        );
        let viewport = request.viewport().unwrap();
        assert_eq!(viewport.center(), Point::new(5.5, -3.0));
        assert!((viewport.zoom() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse(&[("HEIGHT", "10"), ("BBOX", "0,0,1,1")]),
            Err(RequestError::Missing("WIDTH"))
        );
        assert!(matches!(
            parse(&[("WIDTH", "0"), ("HEIGHT", "10"), ("BBOX", "0,0,1,1")]),
            Err(RequestError::InvalidValue { param: "WIDTH", .. })
        ));
        assert!(matches!(
            parse(&[("WIDTH", "10"), ("HEIGHT", "10"), ("BBOX", "0,0,1")]),
            Err(RequestError::InvalidBbox(_))
        ));
        assert!(matches!(
            parse(&[("WIDTH", "10"), ("HEIGHT", "10"), ("BBOX", "1,1,1,5")]),
            Err(RequestError::InvalidBbox(_))
        ));
        assert!(matches!(
            parse(&[
                ("WIDTH", "10"),
                ("HEIGHT", "10"),
                ("BBOX", "0,0,1,1"),
                ("FORMAT", "image/jpeg")
            ]),
            Err(RequestError::UnsupportedFormat(_))
        ));
        assert_eq!(
            parse(&[("WIDTH", "10"), ("HEIGHT", "10"), ("CENTER", "0,0")]),
            Err(RequestError::Missing("ZOOM"))
        );
        assert_eq!(
            parse(&[("WIDTH", "10"), ("HEIGHT", "10")]),
            Err(RequestError::Missing("BBOX"))
        );
        assert!(matches!(
            parse(&[
                ("WIDTH", "10"),
                ("HEIGHT", "10"),
                ("BBOX", "0,0,1,1"),
                ("BGCOLOR", "0xZZ0000")
            ]),
            Err(RequestError::InvalidValue { param: "BGCOLOR", .. })
        ));
    }

    #[test]
    fn test_bbox_viewport_fits_without_margin() {
        let request = parse(&[("WIDTH", "200"), ("HEIGHT", "100"), ("BBOX", "0,0,20,10")]).unwrap();
        let viewport = request.viewport().unwrap();
        assert!((viewport.zoom() - 20.0).abs() < 1e-9);
        assert_eq!(viewport.center(), Point::new(10.0, 5.0));
    }

    #[test]
    fn test_apply_selects_layers() {
        let mut map = Map::new(10, 10).unwrap();
        let group = map.layers_mut().add_group("base");
        let roads = map.layers_mut().add_leaf("roads", FeatureLayer::new());
        let rivers = map.layers_mut().add_leaf("rivers", FeatureLayer::new());
        map.layers_mut().move_to_group(roads, Some(group)).unwrap();
        map.layers_mut().set_visible(group, false).unwrap();

        let request = parse(&[
            ("WIDTH", "20"),
            ("HEIGHT", "20"),
            ("BBOX", "0,0,5,5"),
            ("LAYERS", "roads"),
        ])
        .unwrap();
        request.apply_to(&mut map).unwrap();

        assert_eq!(map.viewport().size(), (20, 20));
        assert!(map.layers().layer(roads).unwrap().is_visible());
        assert!(map.layers().layer(group).unwrap().is_visible());
        assert!(!map.layers().layer(rivers).unwrap().is_visible());
    }

    #[test]
    fn test_apply_rejects_unknown_layer_untouched() {
        let mut map = Map::new(10, 10).unwrap();
        let before = map.viewport().state();
        let request = parse(&[
            ("WIDTH", "20"),
            ("HEIGHT", "20"),
            ("BBOX", "0,0,5,5"),
            ("LAYERS", "missing"),
        ])
        .unwrap();
        assert_eq!(
            request.apply_to(&mut map),
            Err(RequestError::UnknownLayer("missing".into()))
        );
        assert_eq!(map.viewport().state(), before);
    }
}
