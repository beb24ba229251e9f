//! # vm-av
//!
//! Pipeline compilation and supervised ffmpeg execution for vidmorph.
//!
//! This crate provides:
//!
//! - **Pipeline compilation** ([`PipelineCompiler`]) -- turn
//!   [`vm_core::TransformParams`] into an ordered [`TransformPlan`] of video
//!   and audio filters plus encoding options.
//! - **Supervised execution** ([`ProcessSupervisor`]) -- run a plan as a
//!   child process with a timeout, concurrent stderr draining, and
//!   guaranteed termination.
//! - **Concurrency limits** ([`JobSlots`], [`CleanupPool`]) -- bounded
//!   parallel jobs and a separate bounded pool for temp-file removal.
//! - **Tool discovery** ([`ToolRegistry`]) and **probing**
//!   ([`FfprobeProber`]) -- locate ffmpeg/ffprobe and read source dimensions.
//! - **Job files** ([`JobFiles`]) -- unique temp paths per job.

pub mod command;
pub mod pipeline;
pub mod pool;
pub mod probe;
pub mod supervisor;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use pipeline::{PipelineCompiler, SourceMedia, TransformPlan};
pub use pool::{CleanupPool, JobPermit, JobSlots};
pub use probe::{FfprobeProber, VideoDimensions};
pub use supervisor::{ExecutionResult, FailureReason, ProcessSupervisor, SupervisorOptions};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::JobFiles;
