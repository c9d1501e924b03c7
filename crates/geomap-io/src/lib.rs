//! # GeoMap I/O
//!
//! The edges of the engine: GetMap-style request parameters parsed into a
//! view, composites encoded as PNG for a server response, and JSON
//! persistence of view state and map settings.

pub mod encode;
pub mod request;
pub mod state;

pub use encode::{encode_png, handle_get_map, render_response, EncodeError, EncodedImage, ServeError};
pub use request::{MapRequest, RequestError, ViewRequest, PNG_FORMAT};
pub use state::{
    settings_from_json, settings_to_json, view_state_from_json, view_state_to_json,
    viewport_from_json,
};
