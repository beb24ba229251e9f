//! Compiled transformation plans and their filter descriptors.

use std::fmt;
use std::path::{Path, PathBuf};

use vm_core::config::EncodingConfig;

use crate::command::ToolCommand;

/// Separator between filters within one chain.
const CHAIN_SEPARATOR: &str = ",";

/// Render a float the way ffmpeg expressions expect it: shortest
/// round-trip form, always with a fractional part (`1.0`, `0.5`).
pub(crate) fn fmt_float(v: f64) -> String {
    format!("{v:?}")
}

/// One entry of the video filter chain.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoFilter {
    /// `setpts=<factor>*PTS`, where `factor = 1 / speed`.
    Speed { factor: f64 },
    /// `crop=iw-<trim_width>:ih-<trim_height>`.
    Crop { trim_width: u32, trim_height: u32 },
    /// `hue=h=<degrees>:s=<saturation>`.
    Hue { degrees: i32, saturation: f64 },
    /// `colorchannelmixer=rr=..:gg=..:bb=..`.
    ChannelMixer { red: f64, green: f64, blue: f64 },
    /// `eq=contrast=..:brightness=..`.
    Equalizer { contrast: f64, brightness: f64 },
    /// `drawtext` overlay anchored `y_from_bottom` pixels above the bottom edge.
    TextOverlay {
        text: String,
        x: u32,
        y_from_bottom: u32,
        font_size: u32,
        alpha: f64,
    },
    /// `scale=iw:<height>`; width is held fixed.
    Scale { height: u32 },
}

impl fmt::Display for VideoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFilter::Speed { factor } => write!(f, "setpts={}*PTS", fmt_float(*factor)),
            VideoFilter::Crop {
                trim_width,
                trim_height,
            } => write!(f, "crop=iw-{trim_width}:ih-{trim_height}"),
            VideoFilter::Hue {
                degrees,
                saturation,
            } => write!(f, "hue=h={degrees}:s={}", fmt_float(*saturation)),
            VideoFilter::ChannelMixer { red, green, blue } => write!(
                f,
                "colorchannelmixer=rr={}:gg={}:bb={}",
                fmt_float(*red),
                fmt_float(*green),
                fmt_float(*blue)
            ),
            VideoFilter::Equalizer {
                contrast,
                brightness,
            } => write!(
                f,
                "eq=contrast={}:brightness={}",
                fmt_float(*contrast),
                fmt_float(*brightness)
            ),
            VideoFilter::TextOverlay {
                text,
                x,
                y_from_bottom,
                font_size,
                alpha,
            } => write!(
                f,
                "drawtext=text='{text}':x={x}:y=h-th-{y_from_bottom}:\
                 fontsize={font_size}:fontcolor=white@{}",
                fmt_float(*alpha)
            ),
            VideoFilter::Scale { height } => write!(f, "scale=iw:{height}"),
        }
    }
}

/// One entry of the audio filter chain.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioFilter {
    /// `atempo=<speed>`.
    Tempo { speed: f64 },
    /// `asetrate=<base_rate>*<pitch>`.
    SampleRate { base_rate: u32, pitch: f64 },
    /// `aecho=<in_gain>:<out_gain>:<delay_ms>:<decay>`.
    Echo {
        in_gain: f64,
        out_gain: f64,
        delay_ms: u32,
        decay: f64,
    },
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFilter::Tempo { speed } => write!(f, "atempo={}", fmt_float(*speed)),
            AudioFilter::SampleRate { base_rate, pitch } => {
                write!(f, "asetrate={base_rate}*{}", fmt_float(*pitch))
            }
            AudioFilter::Echo {
                in_gain,
                out_gain,
                delay_ms,
                decay,
            } => write!(
                f,
                "aecho={}:{}:{delay_ms}:{}",
                fmt_float(*in_gain),
                fmt_float(*out_gain),
                fmt_float(*decay)
            ),
        }
    }
}

/// Input-side trim: seek to `start_offset_secs` and read `duration_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTrim {
    pub start_offset_secs: u32,
    pub duration_secs: u32,
}

/// Fixed output encoding options appended after the filter chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingOptions {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self::from(&EncodingConfig::default())
    }
}

impl From<&EncodingConfig> for EncodingOptions {
    fn from(config: &EncodingConfig) -> Self {
        Self {
            video_codec: config.video_codec.clone(),
            preset: config.preset.clone(),
            crf: config.crf,
            audio_codec: config.audio_codec.clone(),
        }
    }
}

impl EncodingOptions {
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "-c:v".into(),
            self.video_codec.clone(),
            "-preset".into(),
            self.preset.clone(),
            "-crf".into(),
            self.crf.to_string(),
            "-c:a".into(),
            self.audio_codec.clone(),
        ]
    }
}

/// A fully resolved, ordered description of one ffmpeg run.
///
/// Built by [`PipelineCompiler`](super::PipelineCompiler) and consumed by
/// [`ProcessSupervisor::run`](crate::supervisor::ProcessSupervisor::run).
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    pub(crate) input: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) trim: Option<InputTrim>,
    pub(crate) video: Vec<VideoFilter>,
    pub(crate) audio: Vec<AudioFilter>,
    pub(crate) encoding: EncodingOptions,
}

impl TransformPlan {
    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn trim(&self) -> Option<InputTrim> {
        self.trim
    }

    pub fn video_filters(&self) -> &[VideoFilter] {
        &self.video
    }

    pub fn audio_filters(&self) -> &[AudioFilter] {
        &self.audio
    }

    pub fn encoding(&self) -> &EncodingOptions {
        &self.encoding
    }

    /// Rendered video filters, in chain order.
    pub fn video_descriptors(&self) -> Vec<String> {
        self.video.iter().map(ToString::to_string).collect()
    }

    /// Rendered audio filters, in chain order.
    pub fn audio_descriptors(&self) -> Vec<String> {
        self.audio.iter().map(ToString::to_string).collect()
    }

    /// The `-vf` argument.
    pub fn video_chain(&self) -> String {
        self.video_descriptors().join(CHAIN_SEPARATOR)
    }

    /// The `-af` argument.
    pub fn audio_chain(&self) -> String {
        self.audio_descriptors().join(CHAIN_SEPARATOR)
    }

    /// Full ffmpeg argument vector (program name excluded).
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

        // Trim options must precede -i to apply to the input.
        if let Some(trim) = self.trim {
            args.extend([
                "-ss".into(),
                trim.start_offset_secs.to_string(),
                "-t".into(),
                trim.duration_secs.to_string(),
            ]);
        }

        args.push("-i".into());
        args.push(self.input.to_string_lossy().to_string());

        if !self.video.is_empty() {
            args.push("-vf".into());
            args.push(self.video_chain());
        }
        if !self.audio.is_empty() {
            args.push("-af".into());
            args.push(self.audio_chain());
        }

        args.extend(self.encoding.to_args());
        args.push(self.output.to_string_lossy().to_string());
        args
    }

    /// Turn the plan into an executable command for `program`.
    pub fn to_command(&self, program: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(program.to_path_buf());
        cmd.args(self.to_args());
        cmd
    }

    /// Shell-quoted command line, for logs and dry runs.
    pub fn command_line(&self, program: &Path) -> String {
        self.to_command(program).command_line()
    }
}
