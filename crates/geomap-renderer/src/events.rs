use std::fmt;

use geomap_core::{Envelope, LayerId, RenderError, Viewport};

/// A layer was painted onto the composite.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRendered {
    pub layer_id: LayerId,
    pub name: String,
    pub duration_ms: f64,
}

/// A layer failed to render and was left out of the composite.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerFailed {
    pub layer_id: LayerId,
    pub name: String,
    pub error: RenderError,
}

/// A composite pass finished.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRendered {
    pub generation: u64,
    pub envelope: Envelope,
    pub layers_drawn: usize,
    pub duration_ms: f64,
}

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Registered listeners, invoked synchronously in registration order.
#[derive(Default)]
pub struct MapObservers {
    view_changed: Vec<Listener<Viewport>>,
    layer_rendered: Vec<Listener<LayerRendered>>,
    layer_failed: Vec<Listener<LayerFailed>>,
    map_rendered: Vec<Listener<MapRendered>>,
}

impl MapObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_view_changed(&mut self, listener: impl FnMut(&Viewport) + Send + 'static) {
        self.view_changed.push(Box::new(listener));
    }

    pub fn on_layer_rendered(&mut self, listener: impl FnMut(&LayerRendered) + Send + 'static) {
        self.layer_rendered.push(Box::new(listener));
    }

    pub fn on_layer_failed(&mut self, listener: impl FnMut(&LayerFailed) + Send + 'static) {
        self.layer_failed.push(Box::new(listener));
    }

    pub fn on_map_rendered(&mut self, listener: impl FnMut(&MapRendered) + Send + 'static) {
        self.map_rendered.push(Box::new(listener));
    }

    pub fn notify_view_changed(&mut self, viewport: &Viewport) {
        for listener in &mut self.view_changed {
            listener(viewport);
        }
    }

    pub fn notify_layer_rendered(&mut self, event: &LayerRendered) {
        for listener in &mut self.layer_rendered {
            listener(event);
        }
    }

    pub fn notify_layer_failed(&mut self, event: &LayerFailed) {
        for listener in &mut self.layer_failed {
            listener(event);
        }
    }

    pub fn notify_map_rendered(&mut self, event: &MapRendered) {
        for listener in &mut self.map_rendered {
            listener(event);
        }
    }
}

impl fmt::Debug for MapObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapObservers")
            .field("view_changed", &self.view_changed.len())
            .field("layer_rendered", &self.layer_rendered.len())
            .field("layer_failed", &self.layer_failed.len())
            .field("map_rendered", &self.map_rendered.len())
            .finish()
    }
}
