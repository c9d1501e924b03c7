use thiserror::Error;

use crate::layer::LayerId;

/// Invalid viewport or layer configuration. Never silently clamped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Maximum zoom must be positive, got {0}")]
    NonPositiveMaximumZoom(f64),

    #[error("Minimum zoom must not be negative, got {0}")]
    NegativeMinimumZoom(f64),

    #[error("Minimum zoom {min} exceeds maximum zoom {max}")]
    InvertedZoomBounds { min: f64, max: f64 },

    #[error("Pixel aspect ratio must be positive, got {0}")]
    NonPositivePixelAspectRatio(f64),

    #[error("Viewport size must be positive, got {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Opacity must lie in [0, 1], got {0}")]
    InvalidOpacity(f64),

    #[error("Fit margin must be a finite non-negative fraction, got {0}")]
    InvalidFitMargin(f64),

    #[error("Invalid visibility range [{min}, {max})")]
    InvalidVisibilityRange { min: f64, max: f64 },
}

/// The map display transform cannot be inverted.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum TransformError {
    #[error("Map transform is not invertible (determinant {determinant})")]
    NonInvertible { determinant: f64 },
}

/// Structural errors on the layer tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    #[error("Unknown layer id {0}")]
    UnknownLayer(LayerId),

    #[error("Layer {0} is not a group")]
    NotAGroup(LayerId),

    #[error("Layer {0} is a group and has no drawing source")]
    NotALeaf(LayerId),

    #[error("Cannot move layer {layer} into its own subtree {target}")]
    CyclicGroup { layer: LayerId, target: LayerId },
}

/// A layer source failed to produce an image.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Layer render failed: {0}")]
    Failed(String),

    #[error("Layer produced a {got_width}x{got_height} image for a {width}x{height} viewport")]
    SizeMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
}
