//! Transformation pipeline: parameters in, ordered ffmpeg plan out.

mod compiler;
mod plan;

pub use compiler::{PipelineCompiler, SourceMedia};
pub use plan::{AudioFilter, EncodingOptions, InputTrim, TransformPlan, VideoFilter};
