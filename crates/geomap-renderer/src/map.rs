use std::sync::Arc;

use geomap_core::{Affine2D, ConfigError, Envelope, LayerTree, Point, TransformError, Viewport};

use crate::compositor::{CompositeOutcome, Compositor, RenderResult};
use crate::events::{LayerFailed, LayerRendered, MapObservers, MapRendered};
use crate::settings::MapSettings;

/// Extents smaller than this in both dimensions are treated as a single point.
const EXTENT_EPSILON: f64 = 1e-12;

/// A viewport, its layer tree, and the compositor that paints them.
///
/// This is the surface interactive front-ends and request handlers drive:
/// every view mutation bumps the viewport generation, drops layer caches, and
/// notifies view-changed listeners.
#[derive(Debug)]
pub struct Map {
    viewport: Viewport,
    layers: LayerTree,
    compositor: Arc<Compositor>,
    observers: MapObservers,
    settings: MapSettings,
}

impl Map {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        Self::with_settings(width, height, MapSettings::default())
    }

    pub fn with_settings(width: u32, height: u32, settings: MapSettings) -> Result<Self, ConfigError> {
        let mut viewport = Viewport::new(width, height)?;
        settings.apply_to(&mut viewport)?;
        Ok(Self {
            viewport,
            layers: LayerTree::new(),
            compositor: Arc::new(Compositor::new(&settings)),
            observers: MapObservers::new(),
            settings,
        })
    }

    /// Validate and install new settings. The compositor is replaced so the
    /// new background and cache threshold apply to the next pass.
    pub fn apply_settings(&mut self, settings: MapSettings) -> Result<(), ConfigError> {
        let mut viewport = self.viewport.clone();
        settings.apply_to(&mut viewport)?;
        self.compositor = Arc::new(Compositor::new(&settings));
        self.settings = settings;
        self.commit_view(viewport);
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn layers(&self) -> &LayerTree {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerTree {
        &mut self.layers
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    /// Shared handle for callers compositing from a background task.
    pub fn compositor(&self) -> Arc<Compositor> {
        self.compositor.clone()
    }

    pub fn observers_mut(&mut self) -> &mut MapObservers {
        &mut self.observers
    }

    pub fn on_view_changed(&mut self, listener: impl FnMut(&Viewport) + Send + 'static) {
        self.observers.on_view_changed(listener);
    }

    pub fn on_layer_rendered(&mut self, listener: impl FnMut(&LayerRendered) + Send + 'static) {
        self.observers.on_layer_rendered(listener);
    }

    pub fn on_layer_failed(&mut self, listener: impl FnMut(&LayerFailed) + Send + 'static) {
        self.observers.on_layer_failed(listener);
    }

    pub fn on_map_rendered(&mut self, listener: impl FnMut(&MapRendered) + Send + 'static) {
        self.observers.on_map_rendered(listener);
    }

    // ── View ─────────────────────────────────────────────────────────

    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), ConfigError> {
        self.viewport.set_size(width, height)?;
        self.view_changed();
        Ok(())
    }

    pub fn set_center(&mut self, center: Point) {
        self.viewport.set_center(center);
        self.view_changed();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if self.viewport.set_zoom(zoom) {
            self.view_changed();
        }
    }

    pub fn pan_pixels(&mut self, dx: f64, dy: f64) {
        self.viewport.pan_pixels(dx, dy);
        self.view_changed();
    }

    pub fn zoom_at(&mut self, screen: Point, factor: f64) -> Result<(), TransformError> {
        if self.viewport.zoom_at(screen, factor)? {
            self.view_changed();
        }
        Ok(())
    }

    /// See [`Viewport::zoom_to_fit`]: the resulting view may cover more than
    /// `bbox` when aspect ratios differ.
    pub fn zoom_to_fit(&mut self, bbox: &Envelope, add_margin: bool) -> bool {
        if !self.viewport.zoom_to_fit(bbox, add_margin) {
            return false;
        }
        log::info!("Zoomed to fit {bbox:?}");
        self.view_changed();
        true
    }

    /// Fit the union of all visible layer extents plus the configured margin.
    /// Does nothing when there is no visible data or it collapses to a point.
    pub fn zoom_to_extents(&mut self) -> bool {
        let mut extent = self.layers.visible_extent();
        if extent.is_null() {
            return false;
        }
        let margin = self.viewport.fit_margin();
        extent.expand_by(extent.width() * margin / 2.0, extent.height() * margin / 2.0);
        if extent.width() < EXTENT_EPSILON && extent.height() < EXTENT_EPSILON {
            log::debug!("Visible extent is a single point; not zooming");
            return false;
        }
        self.zoom_to_fit(&extent, false)
    }

    pub fn set_map_transform(&mut self, transform: Affine2D) -> Result<(), TransformError> {
        let result = self.viewport.set_map_transform(transform);
        self.view_changed();
        result
    }

    pub fn set_srs_identifier(&mut self, srs: Option<String>) {
        self.viewport.set_srs_identifier(srs);
        self.view_changed();
    }

    // ── Rendering ────────────────────────────────────────────────────

    /// Paint every visible layer. Returns [`CompositeOutcome::Skipped`] when a
    /// pass on this map's compositor is already running elsewhere.
    pub fn composite(&mut self) -> CompositeOutcome {
        self.compositor
            .composite(&self.viewport, &mut self.layers, &mut self.observers)
    }

    /// Whether `result` still matches the current view. Stale frames from a
    /// superseded background pass should be dropped, never displayed.
    pub fn is_current(&self, result: &RenderResult) -> bool {
        result.generation == self.viewport.generation()
    }

    fn commit_view(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.view_changed();
    }

    fn view_changed(&mut self) {
        self.layers.clear_all_caches();
        self.observers.notify_view_changed(&self.viewport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_layer::FeatureLayer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_view_changes_notify() {
        let mut map = Map::new(100, 100).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        map.on_view_changed(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        map.set_center(Point::new(5.0, 5.0));
        map.zoom_to_fit(&Envelope::new(0.0, 0.0, 1.0, 1.0), true);
        assert!(!map.zoom_to_fit(&Envelope::NULL, true));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zoom_to_extents_uses_visible_layers() {
        let mut map = Map::new(100, 100).unwrap();
        map.layers_mut().add_leaf(
            "a",
            FeatureLayer::new().with_rect(Envelope::new(0.0, 0.0, 100.0, 100.0), [0, 0, 0, 255]),
        );
        let hidden = map.layers_mut().add_leaf(
            "b",
            FeatureLayer::new().with_rect(Envelope::new(1000.0, 1000.0, 2000.0, 2000.0), [0, 0, 0, 255]),
        );
        map.layers_mut().set_visible(hidden, false).unwrap();
        assert!(map.zoom_to_extents());
        assert!((map.viewport().zoom() - 110.0).abs() < 1e-9);
        assert_eq!(map.viewport().center(), Point::new(50.0, 50.0));
    }

    #[test]
    fn test_zoom_to_extents_single_point_is_noop() {
        let mut map = Map::new(100, 100).unwrap();
        map.layers_mut().add_leaf(
            "dot",
            FeatureLayer::new().with_point(Point::new(3.0, 3.0), 2, [0, 0, 0, 255]),
        );
        let before = map.viewport().state();
        assert!(!map.zoom_to_extents());
        assert_eq!(map.viewport().state(), before);
    }

    #[test]
    fn test_apply_settings_validates() {
        let mut map = Map::new(10, 10).unwrap();
        let bad = MapSettings {
            pixel_aspect_ratio: -1.0,
            ..Default::default()
        };
        assert!(map.apply_settings(bad).is_err());
        assert_eq!(map.settings(), &MapSettings::default());

        let good = MapSettings {
            background: [0, 0, 0, 255],
            maximum_zoom: 0.5,
            ..Default::default()
        };
        map.apply_settings(good).unwrap();
        assert!((map.viewport().zoom() - 0.5).abs() < 1e-12);
        assert_eq!(map.compositor().background().0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_is_current_tracks_generation() {
        let mut map = Map::new(4, 4).unwrap();
        let result = map.composite().rendered().unwrap();
        assert!(map.is_current(&result));
        map.pan_pixels(1.0, 0.0);
        assert!(!map.is_current(&result));
    }
}
