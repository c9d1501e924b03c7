//! # GeoMap Renderer
//!
//! Merges the rasters produced by a map's layers into one RGBA canvas.
//!
//! The [`Compositor`] walks the visible layers of a [`geomap_core::LayerTree`]
//! in render order, blends each onto the canvas with its opacity, and applies
//! the viewport's display transform. [`Map`] bundles a viewport, a layer tree,
//! and a compositor behind the navigation API front-ends drive.

pub mod canvas;
pub mod compositor;
pub mod events;
pub mod feature_layer;
pub mod map;
pub mod settings;

pub use compositor::{CompositeOutcome, Compositor, RenderResult};
pub use events::{LayerFailed, LayerRendered, MapObservers, MapRendered};
pub use feature_layer::{Feature, FeatureGeometry, FeatureLayer};
pub use map::Map;
pub use settings::MapSettings;
