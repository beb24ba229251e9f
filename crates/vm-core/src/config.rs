//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! tool, job-execution, and encoding sections. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub jobs: JobsConfig,
    pub encoding: EncodingConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.jobs.max_concurrent == 0 {
            warnings.push("jobs.max_concurrent is 0; it will be treated as 1".into());
        }
        if self.jobs.cleanup_workers == 0 {
            warnings.push("jobs.cleanup_workers is 0; it will be treated as 1".into());
        }
        if self.jobs.timeout_secs == 0 {
            warnings.push("jobs.timeout_secs is 0; every job will time out immediately".into());
        }

        if self.encoding.crf > 51 {
            warnings.push(format!(
                "encoding.crf {} is outside the x264 range 0-51",
                self.encoding.crf
            ));
        }
        if self.encoding.base_sample_rate == 0 {
            warnings.push("encoding.base_sample_rate is 0".into());
        }
        if self.encoding.watermark_text.trim().is_empty() {
            warnings.push("encoding.watermark_text is empty; watermarks will be invisible".into());
        }

        for (name, path) in [
            ("ffmpeg_path", self.tools.ffmpeg_path.as_deref()),
            ("ffprobe_path", self.tools.ffprobe_path.as_deref()),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Job execution limits.
///
/// `max_concurrent` bounds how many external processes run at once;
/// `cleanup_workers` bounds temp-file removal separately so cleanup never
/// queues behind long-running jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub max_concurrent: usize,
    pub cleanup_workers: usize,
    pub timeout_secs: u64,
    /// Time between SIGTERM and SIGKILL when a job is terminated.
    pub kill_grace_ms: u64,
    /// How long to wait for the diagnostic drain task after the process is gone.
    pub drain_grace_ms: u64,
    /// Number of trailing diagnostic lines kept for error reporting.
    pub diagnostic_tail_lines: usize,
    pub temp_dir: PathBuf,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            cleanup_workers: 2,
            timeout_secs: 300,
            kill_grace_ms: 2_000,
            drain_grace_ms: 1_000,
            diagnostic_tail_lines: 20,
            temp_dir: PathBuf::from("temp_videos"),
        }
    }
}

impl JobsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

/// Output encoding and filter defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    /// Sample rate that `pitch` multiplies in the `asetrate` filter.
    pub base_sample_rate: u32,
    pub watermark_text: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            preset: "fast".into(),
            crf: 23,
            audio_codec: "aac".into(),
            base_sample_rate: 44_100,
            watermark_text: "UserContent".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.jobs.max_concurrent, 4);
        assert_eq!(cfg.jobs.cleanup_workers, 2);
        assert_eq!(cfg.jobs.timeout(), Duration::from_secs(300));
        assert_eq!(cfg.encoding.video_codec, "libx264");
        assert_eq!(cfg.encoding.preset, "fast");
        assert_eq!(cfg.encoding.crf, 23);
        assert_eq!(cfg.encoding.base_sample_rate, 44_100);
        assert_eq!(cfg.jobs.temp_dir, PathBuf::from("temp_videos"));
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn zero_limits_warn() {
        let mut cfg = Config::default();
        cfg.jobs.max_concurrent = 0;
        cfg.jobs.timeout_secs = 0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("max_concurrent")));
        assert!(warnings.iter().any(|w| w.contains("timeout_secs")));
    }

    #[test]
    fn missing_tool_path_warns() {
        let mut cfg = Config::default();
        cfg.tools.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("ffmpeg_path")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"jobs": {"max_concurrent": 8}, "encoding": {"crf": 18}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.jobs.max_concurrent, 8);
        assert_eq!(cfg.jobs.cleanup_workers, 2);
        assert_eq!(cfg.encoding.crf, 18);
        assert_eq!(cfg.encoding.preset, "fast");
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.jobs.max_concurrent, 4);
    }

    #[test]
    fn parse_invalid_json_is_validation_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None);
        assert_eq!(cfg.jobs.timeout_secs, 300);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vidmorph.json");
        std::fs::write(&path, r#"{"jobs": {"timeout_secs": 42}}"#).unwrap();
        let cfg = Config::load_or_default(Some(&path));
        assert_eq!(cfg.jobs.timeout_secs, 42);
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.jobs.timeout_secs, 300);
    }
}
