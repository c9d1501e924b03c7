use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use image::{Rgba, RgbaImage};

use geomap_core::{Envelope, LayerTree, TransformError, Viewport};

use crate::canvas;
use crate::events::{LayerFailed, LayerRendered, MapObservers, MapRendered};
use crate::settings::MapSettings;

/// The merged raster of one composite pass.
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// Shared so callers can hold a frame while the next one is produced;
    /// the compositor never writes into an image a caller still holds.
    pub image: Arc<RgbaImage>,
    /// World envelope the image covers.
    pub envelope: Envelope,
    /// Viewport generation the image was produced for.
    pub generation: u64,
    /// Set when the map transform was singular and identity was used.
    pub transform_fault: Option<TransformError>,
    pub layers_drawn: usize,
}

/// Outcome of [`Compositor::composite`].
#[derive(Debug, Clone)]
pub enum CompositeOutcome {
    Rendered(RenderResult),
    /// Another composite was in flight on this compositor.
    Skipped,
}

impl CompositeOutcome {
    pub fn rendered(self) -> Option<RenderResult> {
        match self {
            CompositeOutcome::Rendered(result) => Some(result),
            CompositeOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CompositeOutcome::Skipped)
    }
}

/// Paints visible layers, lowest render order first, onto a canvas.
///
/// One pass runs at a time per compositor: a call made while another pass is
/// in flight returns [`CompositeOutcome::Skipped`] immediately instead of
/// waiting.
#[derive(Debug)]
pub struct Compositor {
    background: Rgba<u8>,
    fast_render_threshold_ms: f64,
    in_progress: AtomicBool,
    canvas: Mutex<Option<Arc<RgbaImage>>>,
}

/// Clears the in-progress flag when a pass ends, including by panic.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(&MapSettings::default())
    }
}

impl Compositor {
    pub fn new(settings: &MapSettings) -> Self {
        Self {
            background: Rgba(settings.background),
            fast_render_threshold_ms: settings.fast_render_threshold_ms,
            in_progress: AtomicBool::new(false),
            canvas: Mutex::new(None),
        }
    }

    pub fn background(&self) -> Rgba<u8> {
        self.background
    }

    pub fn is_busy(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn composite(
        &self,
        viewport: &Viewport,
        layers: &mut LayerTree,
        observers: &mut MapObservers,
    ) -> CompositeOutcome {
        let Some(_guard) = FlightGuard::acquire(&self.in_progress) else {
            log::warn!(
                "Composite for generation {} skipped: another pass is in flight",
                viewport.generation()
            );
            return CompositeOutcome::Skipped;
        };
        let started = Instant::now();
        let mut canvas = self.take_canvas(viewport.size());
        canvas::clear(&mut canvas, self.background);

        let mut layers_drawn = 0;
        for id in layers.flatten_visible() {
            let Some(layer) = layers.get_mut(id) else {
                continue;
            };
            let opacity = layer.opacity();
            let name = layer.name().to_string();
            match layer.render(viewport) {
                Ok(Some(image)) => canvas::draw_layer(&mut canvas, image, opacity),
                Ok(None) => continue,
                Err(error) => {
                    log::warn!("Layer '{name}' skipped: {error}");
                    observers.notify_layer_failed(&LayerFailed {
                        layer_id: id,
                        name,
                        error,
                    });
                    continue;
                }
            }
            layers_drawn += 1;
            let duration_ms = layer.last_render_duration_ms();
            observers.notify_layer_rendered(&LayerRendered {
                layer_id: id,
                name,
                duration_ms,
            });
            if duration_ms < self.fast_render_threshold_ms {
                layer.clear_cache();
            }
        }

        let transform_fault = viewport.transform_fault();
        if let Some(fault) = &transform_fault {
            log::warn!("{fault}; composite left untransformed");
        }
        let display = viewport.display_transform();
        if !display.is_identity() {
            canvas = canvas::apply_transform(&canvas, &display, self.background);
        }

        let image = Arc::new(canvas);
        *self.canvas.lock().unwrap_or_else(PoisonError::into_inner) = Some(image.clone());

        let envelope = viewport.envelope();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "Composited {layers_drawn} layers for generation {} in {duration_ms:.2} ms",
            viewport.generation()
        );
        observers.notify_map_rendered(&MapRendered {
            generation: viewport.generation(),
            envelope,
            layers_drawn,
            duration_ms,
        });

        CompositeOutcome::Rendered(RenderResult {
            image,
            envelope,
            generation: viewport.generation(),
            transform_fault,
            layers_drawn,
        })
    }

    /// Reuse the previous canvas when no caller still holds it and the size
    /// is unchanged; otherwise allocate a fresh one.
    fn take_canvas(&self, (width, height): (u32, u32)) -> RgbaImage {
        let previous = self
            .canvas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous.map(Arc::try_unwrap) {
            Some(Ok(image)) if image.dimensions() == (width, height) => image,
            _ => RgbaImage::new(width, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomap_core::{LayerSource, RenderError};

    struct Fill(Rgba<u8>);

    impl LayerSource for Fill {
        fn render(&mut self, viewport: &Viewport) -> Result<RgbaImage, RenderError> {
            let (w, h) = viewport.size();
            Ok(RgbaImage::from_pixel(w, h, self.0))
        }

        fn extent(&self) -> Envelope {
            Envelope::NULL
        }
    }

    #[test]
    fn test_guard_is_single_flight() {
        let flag = AtomicBool::new(false);
        let first = FlightGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(FlightGuard::acquire(&flag).is_none());
        drop(first);
        assert!(FlightGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_fast_layers_release_cache() {
        let settings = MapSettings {
            fast_render_threshold_ms: f64::MAX,
            ..Default::default()
        };
        let compositor = Compositor::new(&settings);
        let viewport = Viewport::new(3, 3).unwrap();
        let mut layers = LayerTree::new();
        let id = layers.add_leaf("fill", Fill(Rgba([1, 2, 3, 255])));
        let result = compositor
            .composite(&viewport, &mut layers, &mut MapObservers::new())
            .rendered()
            .unwrap();
        assert_eq!(*result.image.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
        assert!(layers.get(id).unwrap().cached_image().is_none());
    }

    #[test]
    fn test_slow_layers_keep_cache() {
        let settings = MapSettings {
            fast_render_threshold_ms: -1.0,
            ..Default::default()
        };
        let compositor = Compositor::new(&settings);
        let viewport = Viewport::new(3, 3).unwrap();
        let mut layers = LayerTree::new();
        let id = layers.add_leaf("fill", Fill(Rgba([1, 2, 3, 255])));
        compositor.composite(&viewport, &mut layers, &mut MapObservers::new());
        assert!(layers.get(id).unwrap().has_current_cache(&viewport));
    }

    #[test]
    fn test_held_frame_is_not_reused() {
        let compositor = Compositor::default();
        let viewport = Viewport::new(2, 2).unwrap();
        let mut layers = LayerTree::new();
        let first = compositor
            .composite(&viewport, &mut layers, &mut MapObservers::new())
            .rendered()
            .unwrap();
        let second = compositor
            .composite(&viewport, &mut layers, &mut MapObservers::new())
            .rendered()
            .unwrap();
        assert!(!Arc::ptr_eq(&first.image, &second.image));
    }
}
