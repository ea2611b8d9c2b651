//! Configuration module
//!
//! Loads and validates the tracker configuration: stack limits, diagnostic
//! retention, and per-entity-type spawn tracking.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{MAX_SANE_DEPTH, ValidationResult, Validator};
