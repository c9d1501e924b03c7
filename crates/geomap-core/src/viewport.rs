use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TransformError};
use crate::geometry::{Envelope, Point};
use crate::transform::Affine2D;

/// Fraction of the box size added around a fit when a margin is requested.
pub const DEFAULT_FIT_MARGIN: f64 = 0.10;

/// Flat record of the view that callers persist between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub center_x: f64,
    pub center_y: f64,
    /// Width of the view in world units.
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
}

/// Everything a layer raster depends on: the world area, the pixel grid,
/// and the SRS. Two views with equal keys produce identical layer images.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewKey {
    pub envelope: Envelope,
    pub width: u32,
    pub height: u32,
    pub srs_identifier: Option<String>,
}

/// The mutable view state defining the world-to-screen mapping.
///
/// `zoom` is the width of the view in world units; the world height follows
/// from the pixel size and the pixel aspect ratio. Every setter that moves or
/// scales the view routes through a single refit against the desired
/// envelope, so the framing requested by the last explicit fit survives
/// resizes. Each mutation bumps [`Viewport::generation`].
#[derive(Debug, Clone)]
pub struct Viewport {
    center: Point,
    zoom: f64,
    width: u32,
    height: u32,
    pixel_aspect_ratio: f64,
    minimum_zoom: f64,
    maximum_zoom: f64,
    fit_margin: f64,
    desired_envelope: Envelope,
    map_transform: Affine2D,
    map_transform_inverse: Option<Affine2D>,
    srs_identifier: Option<String>,
    generation: u64,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        check_size(width, height)?;
        Ok(Self {
            center: Point::new(0.0, 0.0),
            zoom: 1.0,
            width,
            height,
            pixel_aspect_ratio: 1.0,
            minimum_zoom: 0.0,
            maximum_zoom: f64::MAX,
            fit_margin: DEFAULT_FIT_MARGIN,
            desired_envelope: Envelope::NULL,
            map_transform: Affine2D::IDENTITY,
            map_transform_inverse: Some(Affine2D::IDENTITY),
            srs_identifier: None,
            generation: 0,
        })
    }

    /// Rebuild a viewport from a persisted record. The zoom is clamped to the
    /// default bounds; no desired envelope is carried over.
    pub fn from_state(state: &ViewState) -> Result<Self, ConfigError> {
        let mut viewport = Self::new(state.width, state.height)?;
        viewport.center = Point::new(state.center_x, state.center_y);
        if state.zoom > 0.0 {
            viewport.zoom = viewport.clamp_zoom(state.zoom);
        }
        Ok(viewport)
    }

    pub fn state(&self) -> ViewState {
        ViewState {
            center_x: self.center.x,
            center_y: self.center.y,
            zoom: self.zoom,
            width: self.width,
            height: self.height,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_aspect_ratio(&self) -> f64 {
        self.pixel_aspect_ratio
    }

    pub fn minimum_zoom(&self) -> f64 {
        self.minimum_zoom
    }

    pub fn maximum_zoom(&self) -> f64 {
        self.maximum_zoom
    }

    pub fn fit_margin(&self) -> f64 {
        self.fit_margin
    }

    /// The last explicitly requested framing; null until a fit, pan, or
    /// zoom has been requested.
    pub fn desired_envelope(&self) -> Envelope {
        self.desired_envelope
    }

    pub fn map_transform(&self) -> Affine2D {
        self.map_transform
    }

    /// The transform actually applied to the composite: the map transform,
    /// or identity when the map transform cannot be inverted.
    pub fn display_transform(&self) -> Affine2D {
        match self.map_transform_inverse {
            Some(_) => self.map_transform,
            None => Affine2D::IDENTITY,
        }
    }

    /// Set when the configured map transform is singular.
    pub fn transform_fault(&self) -> Option<TransformError> {
        match self.map_transform_inverse {
            Some(_) => None,
            None => Some(TransformError::NonInvertible {
                determinant: self.map_transform.determinant(),
            }),
        }
    }

    pub fn srs_identifier(&self) -> Option<&str> {
        self.srs_identifier.as_deref()
    }

    /// Monotonic counter bumped on every view mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generations are per viewport, so caches shared between viewports key
    /// on this instead.
    pub fn view_key(&self) -> ViewKey {
        ViewKey {
            envelope: self.envelope(),
            width: self.width,
            height: self.height,
            srs_identifier: self.srs_identifier.clone(),
        }
    }

    // ── Derived geometry ─────────────────────────────────────────────

    /// World units covered by one pixel horizontally.
    pub fn pixel_width(&self) -> f64 {
        self.zoom / self.width as f64
    }

    /// World units covered by one pixel vertically.
    pub fn pixel_height(&self) -> f64 {
        self.pixel_width() * self.pixel_aspect_ratio
    }

    pub fn world_height(&self) -> f64 {
        self.world_height_for(self.zoom)
    }

    fn world_height_for(&self, zoom: f64) -> f64 {
        zoom * self.height as f64 / self.width as f64 * self.pixel_aspect_ratio
    }

    /// The world envelope currently covered by the view.
    pub fn envelope(&self) -> Envelope {
        Envelope::centred_at(self.center, self.zoom, self.world_height())
    }

    // ── Coordinate conversion ────────────────────────────────────────

    /// World to image pixel, ignoring the display transform. Layers render in
    /// this space.
    pub fn world_to_image(&self, p: Point) -> Point {
        let world_left = self.center.x - self.zoom / 2.0;
        let world_top = self.center.y + self.world_height() / 2.0;
        Point::new(
            (p.x - world_left) / self.pixel_width(),
            (world_top - p.y) / self.pixel_height(),
        )
    }

    /// Image pixel to world, ignoring the display transform.
    pub fn image_to_world(&self, p: Point) -> Point {
        let world_left = self.center.x - self.zoom / 2.0;
        let world_top = self.center.y + self.world_height() / 2.0;
        Point::new(
            world_left + p.x * self.pixel_width(),
            world_top - p.y * self.pixel_height(),
        )
    }

    /// World to screen pixel. Y is inverted: world Y grows upward, screen Y
    /// grows downward.
    pub fn world_to_screen(&self, p: Point) -> Point {
        self.display_transform().apply(self.world_to_image(p))
    }

    /// Screen pixel to world. Fails when the map transform is singular.
    pub fn screen_to_world(&self, p: Point) -> Result<Point, TransformError> {
        let inverse = self.map_transform_inverse.ok_or(TransformError::NonInvertible {
            determinant: self.map_transform.determinant(),
        })?;
        Ok(self.image_to_world(inverse.apply(p)))
    }

    // ── Configuration ────────────────────────────────────────────────

    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), ConfigError> {
        check_size(width, height)?;
        let target = self.fit_target();
        self.width = width;
        self.height = height;
        self.refit_to(target);
        Ok(())
    }

    pub fn set_pixel_aspect_ratio(&mut self, ratio: f64) -> Result<(), ConfigError> {
        if !(ratio > 0.0 && ratio.is_finite()) {
            return Err(ConfigError::NonPositivePixelAspectRatio(ratio));
        }
        let target = self.fit_target();
        self.pixel_aspect_ratio = ratio;
        self.refit_to(target);
        Ok(())
    }

    pub fn set_minimum_zoom(&mut self, minimum: f64) -> Result<(), ConfigError> {
        self.set_zoom_bounds(minimum, self.maximum_zoom)
    }

    pub fn set_maximum_zoom(&mut self, maximum: f64) -> Result<(), ConfigError> {
        self.set_zoom_bounds(self.minimum_zoom, maximum)
    }

    /// Replace both zoom bounds at once and re-clamp the current zoom.
    pub fn set_zoom_bounds(&mut self, minimum: f64, maximum: f64) -> Result<(), ConfigError> {
        if !(maximum > 0.0) {
            return Err(ConfigError::NonPositiveMaximumZoom(maximum));
        }
        if !(minimum >= 0.0) {
            return Err(ConfigError::NegativeMinimumZoom(minimum));
        }
        if minimum > maximum {
            return Err(ConfigError::InvertedZoomBounds {
                min: minimum,
                max: maximum,
            });
        }
        self.minimum_zoom = minimum;
        self.maximum_zoom = maximum;
        if self.zoom < minimum || self.zoom > maximum {
            self.set_zoom(self.zoom);
        }
        Ok(())
    }

    pub fn set_fit_margin(&mut self, margin: f64) -> Result<(), ConfigError> {
        if !(margin >= 0.0 && margin.is_finite()) {
            return Err(ConfigError::InvalidFitMargin(margin));
        }
        self.fit_margin = margin;
        Ok(())
    }

    /// Install a display transform applied to the final composite.
    ///
    /// A singular transform is stored but not used: the view falls back to
    /// identity, [`Viewport::transform_fault`] reports the condition, and the
    /// error is returned to the caller.
    pub fn set_map_transform(&mut self, transform: Affine2D) -> Result<(), TransformError> {
        self.map_transform = transform;
        self.generation += 1;
        match transform.inverse() {
            Ok(inverse) => {
                self.map_transform_inverse = Some(inverse);
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}; falling back to identity display transform");
                self.map_transform_inverse = None;
                Err(err)
            }
        }
    }

    pub fn set_srs_identifier(&mut self, srs: Option<String>) {
        self.srs_identifier = srs;
        self.generation += 1;
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// Set the view width in world units, clamped to the zoom bounds.
    ///
    /// The desired envelope is rescaled by the ratio of new to old zoom so
    /// later resizes keep the new framing. Returns `false` when the clamped
    /// zoom is not positive.
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        let clamped = self.clamp_zoom(zoom);
        if !(clamped > 0.0) {
            log::warn!("Ignoring non-positive zoom {zoom}");
            return false;
        }
        let mut target = self.fit_target();
        let old_zoom = self.fit_zoom(&target);
        if old_zoom > 0.0 {
            target.scale_about_centre(clamped / old_zoom);
        }
        self.desired_envelope = target;
        self.refit_to(target);
        true
    }

    /// Centre the view on `center`, keeping the desired framing size.
    pub fn set_center(&mut self, center: Point) {
        let mut target = self.fit_target();
        target.set_centre(center);
        self.desired_envelope = target;
        self.refit_to(target);
    }

    /// Fit the view so `bbox` is fully visible.
    ///
    /// The view may cover more area than requested: when the box's aspect
    /// ratio differs from the viewport's, the zoom grows until the taller
    /// dimension fits. Empty or single-point boxes are ignored and `false` is
    /// returned.
    pub fn zoom_to_fit(&mut self, bbox: &Envelope, add_margin: bool) -> bool {
        if bbox.is_degenerate() {
            log::debug!("Ignoring fit to degenerate envelope {bbox:?}");
            return false;
        }
        let mut target = *bbox;
        if add_margin {
            target.expand_by(
                target.width() * self.fit_margin / 2.0,
                target.height() * self.fit_margin / 2.0,
            );
        }
        self.desired_envelope = target;
        self.refit_to(target);
        true
    }

    /// Move the view by a drag delta in screen pixels: the content follows
    /// the pointer, so the centre moves the opposite way.
    pub fn pan_pixels(&mut self, dx: f64, dy: f64) {
        let center = self
            .center
            .translate(-dx * self.pixel_width(), dy * self.pixel_height());
        self.set_center(center);
    }

    /// Magnify by `factor` keeping the world point under `screen` fixed.
    /// Factors above 1 zoom in.
    pub fn zoom_at(&mut self, screen: Point, factor: f64) -> Result<bool, TransformError> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Ok(false);
        }
        let before = self.screen_to_world(screen)?;
        if !self.set_zoom(self.zoom / factor) {
            return Ok(false);
        }
        let after = self.screen_to_world(screen)?;
        let center = self.center.translate(before.x - after.x, before.y - after.y);
        self.set_center(center);
        Ok(true)
    }

    // ── Refit ────────────────────────────────────────────────────────

    /// The box the next refit frames: the desired envelope, or the current
    /// view when nothing was requested yet.
    fn fit_target(&self) -> Envelope {
        if self.desired_envelope.is_degenerate() {
            self.envelope()
        } else {
            self.desired_envelope
        }
    }

    /// Unclamped zoom that makes `target` fully visible.
    fn fit_zoom(&self, target: &Envelope) -> f64 {
        let mut zoom = target.width();
        if self.world_height_for(zoom) < target.height() {
            zoom = target.height() * self.width as f64
                / (self.height as f64 * self.pixel_aspect_ratio);
        }
        zoom
    }

    fn refit_to(&mut self, target: Envelope) {
        let zoom = self.fit_zoom(&target);
        if zoom > 0.0 {
            self.zoom = self.clamp_zoom(zoom);
        }
        self.center = target.centre();
        self.generation += 1;
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.max(self.minimum_zoom).min(self.maximum_zoom)
    }
}

fn check_size(width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::InvalidSize { width, height });
    }
    Ok(())
}
