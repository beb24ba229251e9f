//! vm-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for the other vidmorph crates,
//! providing the unified error type, the transformation parameter set, typed
//! job identifiers, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod params;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::JobId;
pub use params::{FeatureToggles, TransformParams};
