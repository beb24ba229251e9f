use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vm_core::{FeatureToggles, TransformParams};

#[derive(Parser)]
#[command(name = "vidmorph")]
#[command(author, version, about = "Parameterised media transformation driven by ffmpeg")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transform a media file and write the result
    Transform {
        /// Input media file
        #[arg(required = true)]
        input: PathBuf,

        /// Destination for the transformed file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        params: ParamArgs,

        /// Timeout in seconds (defaults to the configured value)
        #[arg(long)]
        timeout: Option<u64>,

        /// Seed for reproducible randomised filters
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the ffmpeg invocation a transformation would run
    Plan {
        /// Input media file (not read unless --aspect needs probing)
        #[arg(required = true)]
        input: PathBuf,

        /// Output path to place in the plan
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,

        #[command(flatten)]
        params: ParamArgs,

        /// Source video height; probed with ffprobe when omitted and --aspect is set
        #[arg(long)]
        height: Option<u32>,

        /// Seed for reproducible randomised filters
        #[arg(long)]
        seed: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a media file and display its video dimensions
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Transformation parameters shared by `transform` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct ParamArgs {
    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Pitch multiplier
    #[arg(long, default_value_t = 1.0)]
    pub pitch: f64,

    /// Overlay a semi-transparent text watermark
    #[arg(long)]
    pub watermark: bool,

    /// Apply colour channel and contrast variation
    #[arg(long)]
    pub filters: bool,

    /// Rescale the video height
    #[arg(long)]
    pub aspect: bool,

    /// Trim a random segment (with an analysis toggle)
    #[arg(long)]
    pub random_cuts: bool,

    /// Add an echo to the audio
    #[arg(long)]
    pub audio_mix: bool,

    /// Apply crop and hue variation
    #[arg(long)]
    pub ai_detection: bool,

    /// Apply crop and hue variation
    #[arg(long)]
    pub auto_edit: bool,

    /// Apply crop and hue variation
    #[arg(long)]
    pub content_analysis: bool,
}

impl ParamArgs {
    pub fn to_params(&self) -> TransformParams {
        TransformParams::new(self.speed, self.pitch).with_toggles(FeatureToggles {
            watermark: self.watermark,
            filters: self.filters,
            aspect: self.aspect,
            random_cuts: self.random_cuts,
            audio_mix: self.audio_mix,
            ai_detection: self.ai_detection,
            auto_edit: self.auto_edit,
            content_analysis: self.content_analysis,
        })
    }
}
