//! Shared utilities.

pub mod clock;
pub mod json;
pub mod telemetry;

pub use clock::*;
pub use json::{canonical_json, canonicalize, to_owned_value};
pub use telemetry::*;
