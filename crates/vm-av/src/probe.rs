//! Source dimension probing via ffprobe.
//!
//! The aspect filter needs the source height before a plan can be compiled,
//! so callers probe the staged input first.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::command::ToolCommand;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Width and height of the primary video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Probe the first video stream of `path`.
    pub async fn video_dimensions(&self, path: &Path) -> vm_core::Result<VideoDimensions> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(PROBE_TIMEOUT);
        cmd.args(["-v", "error"]);
        cmd.args(["-select_streams", "v:0"]);
        cmd.args(["-show_entries", "stream=width,height"]);
        cmd.args(["-of", "json"]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await?;
        parse_dimensions(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

fn parse_dimensions(json: &str) -> vm_core::Result<VideoDimensions> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| vm_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let stream = ff
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| vm_core::Error::Probe("no video stream found".into()))?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            Ok(VideoDimensions { width, height })
        }
        _ => Err(vm_core::Error::Probe(
            "video stream has no dimensions".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typical_output() {
        let json = r#"{
            "programs": [],
            "streams": [{ "width": 1920, "height": 1080 }]
        }"#;
        assert_eq!(
            parse_dimensions(json).unwrap(),
            VideoDimensions {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn no_streams_is_probe_error() {
        let err = parse_dimensions(r#"{"programs": [], "streams": []}"#).unwrap_err();
        assert!(matches!(err, vm_core::Error::Probe(_)));
        assert!(err.to_string().contains("no video stream"));
    }

    #[test]
    fn zero_height_is_probe_error() {
        let err = parse_dimensions(r#"{"streams": [{"width": 640, "height": 0}]}"#).unwrap_err();
        assert!(err.to_string().contains("no dimensions"));
    }

    #[test]
    fn invalid_json_is_probe_error() {
        let err = parse_dimensions("not json").unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[tokio::test]
    async fn missing_ffprobe_binary_errors() {
        let prober = FfprobeProber::new(PathBuf::from("nonexistent_ffprobe_xyz"));
        let err = prober
            .video_dimensions(Path::new("/tmp/in.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, vm_core::Error::Tool { .. }));
    }
}
