//! vidmorph - parameterised media transformation driven by ffmpeg
//!
//! This library crate exposes the job flow for integration testing.

pub mod transform;

pub use transform::{TransformOutcome, TransformRequest, TransformService};
