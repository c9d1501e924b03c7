use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use geomap_core::{Envelope, LayerSource, Point, RenderError, SpatialEntry, SpatialIndex, Viewport};

use crate::canvas;

/// Geometry of a vector feature in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureGeometry {
    /// Filled axis-aligned box.
    Rect(Envelope),
    /// Square marker centred on the point.
    Point { at: Point, radius_px: u32 },
}

impl FeatureGeometry {
    pub fn envelope(&self) -> Envelope {
        match self {
            FeatureGeometry::Rect(env) => *env,
            FeatureGeometry::Point { at, .. } => Envelope::new(at.x, at.y, at.x, at.y),
        }
    }
}

/// A styled feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: FeatureGeometry,
    /// RGBA
    pub color: [u8; 4],
}

/// Vector layer that rasterizes its features through the viewport
/// transform, culled with an R-tree against the visible envelope.
#[derive(Debug, Default)]
pub struct FeatureLayer {
    features: Vec<Feature>,
    index: SpatialIndex,
}

impl FeatureLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        let entries = features
            .iter()
            .enumerate()
            .map(|(feature_index, f)| SpatialEntry {
                feature_index,
                envelope: f.geometry.envelope(),
            })
            .collect();
        Self {
            features,
            index: SpatialIndex::build(entries),
        }
    }

    pub fn with_rect(mut self, envelope: Envelope, color: [u8; 4]) -> Self {
        self.add_feature(Feature {
            geometry: FeatureGeometry::Rect(envelope),
            color,
        });
        self
    }

    pub fn with_point(mut self, at: Point, radius_px: u32, color: [u8; 4]) -> Self {
        self.add_feature(Feature {
            geometry: FeatureGeometry::Point { at, radius_px },
            color,
        });
        self
    }

    pub fn add_feature(&mut self, feature: Feature) {
        self.index.insert(SpatialEntry {
            feature_index: self.features.len(),
            envelope: feature.geometry.envelope(),
        });
        self.features.push(feature);
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Indices of features whose envelope contains `p`.
    pub fn features_at(&self, p: &Point) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .index
            .query_point(p)
            .into_iter()
            .map(|e| e.feature_index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

impl LayerSource for FeatureLayer {
    fn render(&mut self, viewport: &Viewport) -> Result<RgbaImage, RenderError> {
        let (width, height) = viewport.size();
        let mut image = RgbaImage::new(width, height);

        // Markers extend past their point, so pad the query by the largest radius.
        let max_radius = self
            .features
            .iter()
            .filter_map(|f| match f.geometry {
                FeatureGeometry::Point { radius_px, .. } => Some(radius_px),
                FeatureGeometry::Rect(_) => None,
            })
            .max()
            .unwrap_or(0);
        let mut query = viewport.envelope();
        query.expand_by(
            f64::from(max_radius) * viewport.pixel_width(),
            f64::from(max_radius) * viewport.pixel_height(),
        );

        let mut visible: Vec<usize> = self
            .index
            .query_envelope(&query)
            .into_iter()
            .map(|e| e.feature_index)
            .collect();
        visible.sort_unstable();

        for feature in visible.iter().filter_map(|i| self.features.get(*i)) {
            let color = Rgba(feature.color);
            match &feature.geometry {
                FeatureGeometry::Rect(env) => {
                    let top_left = viewport.world_to_image(Point::new(env.min_x, env.max_y));
                    let bottom_right = viewport.world_to_image(Point::new(env.max_x, env.min_y));
                    fill_span(&mut image, top_left, bottom_right, color);
                }
                FeatureGeometry::Point { at, radius_px } => {
                    let centre = viewport.world_to_image(*at);
                    let r = f64::from(*radius_px);
                    fill_span(
                        &mut image,
                        Point::new(centre.x - r, centre.y - r),
                        Point::new(centre.x + r, centre.y + r),
                        color,
                    );
                }
            }
        }
        log::debug!("Rasterized {} of {} features", visible.len(), self.features.len());
        Ok(image)
    }

    fn extent(&self) -> Envelope {
        self.index.extent()
    }
}

/// Fill the pixels whose centres fall in `[min, max)`; a span thinner than a
/// pixel still covers the pixel it lands in.
fn fill_span(image: &mut RgbaImage, min: Point, max: Point, color: Rgba<u8>) {
    let (x0, x1) = pixel_range(min.x, max.x, image.width());
    let (y0, y1) = pixel_range(min.y, max.y, image.height());
    for y in y0..y1 {
        for x in x0..x1 {
            canvas::blend_pixel(image, x, y, color);
        }
    }
}

fn pixel_range(from: f64, to: f64, limit: u32) -> (i64, i64) {
    let mut start = (from - 0.5).ceil();
    let mut end = (to - 0.5).ceil();
    if end <= start {
        start = from.floor();
        end = start + 1.0;
    }
    let limit = f64::from(limit);
    (start.clamp(0.0, limit) as i64, end.clamp(0.0, limit) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn viewport() -> Viewport {
        let mut vp = Viewport::new(10, 10).unwrap();
        vp.zoom_to_fit(&Envelope::new(0.0, 0.0, 10.0, 10.0), false);
        vp
    }

    #[test]
    fn test_rect_fills_expected_pixels() {
        let mut layer = FeatureLayer::new().with_rect(Envelope::new(0.0, 5.0, 5.0, 10.0), RED);
        let image = layer.render(&viewport()).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, RED);
        assert_eq!(image.get_pixel(4, 4).0, RED);
        assert_eq!(image.get_pixel(5, 5).0[3], 0);
        assert_eq!(image.get_pixel(9, 9).0[3], 0);
    }

    #[test]
    fn test_point_marker() {
        let mut layer = FeatureLayer::new().with_point(Point::new(5.0, 5.0), 1, RED);
        let image = layer.render(&viewport()).unwrap();
        assert_eq!(image.get_pixel(5, 5).0, RED);
        assert_eq!(image.get_pixel(4, 4).0, RED);
        assert_eq!(image.get_pixel(7, 7).0[3], 0);
    }

    #[test]
    fn test_offscreen_features_culled() {
        let mut layer = FeatureLayer::new().with_rect(Envelope::new(100.0, 100.0, 110.0, 110.0), RED);
        let image = layer.render(&viewport()).unwrap();
        assert!(image.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_extent_and_hit_test() {
        let layer = FeatureLayer::from_features(vec![
            Feature {
                geometry: FeatureGeometry::Rect(Envelope::new(0.0, 0.0, 4.0, 4.0)),
                color: RED,
            },
            Feature {
                geometry: FeatureGeometry::Point {
                    at: Point::new(10.0, -2.0),
                    radius_px: 2,
                },
                color: RED,
            },
        ]);
        assert_eq!(layer.extent(), Envelope::new(0.0, -2.0, 10.0, 4.0));
        assert_eq!(layer.features_at(&Point::new(1.0, 1.0)), vec![0]);
        assert!(layer.features_at(&Point::new(5.0, 5.0)).is_empty());
    }
}
