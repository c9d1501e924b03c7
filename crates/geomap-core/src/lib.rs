//! # GeoMap Core
//!
//! Viewport model for map rendering: world/screen coordinate transforms,
//! envelopes, zoom and pan with a persistent desired framing, and the layer
//! tree that the compositor paints.
//!
//! Nothing here draws pixels. Layers expose a [`LayerSource`] capability that
//! produces a raster for a [`Viewport`]; merging those rasters is the job of
//! `geomap-renderer`.

pub mod error;
pub mod geometry;
pub mod layer;
pub mod spatial;
pub mod transform;
pub mod viewport;

pub use error::{ConfigError, LayerError, RenderError, TransformError};
pub use geometry::{Envelope, Point};
pub use layer::{Layer, LayerId, LayerKind, LayerSource, LayerTree, OrderScope};
pub use spatial::{SpatialEntry, SpatialIndex};
pub use transform::Affine2D;
pub use viewport::{ViewKey, ViewState, Viewport, DEFAULT_FIT_MARGIN};
