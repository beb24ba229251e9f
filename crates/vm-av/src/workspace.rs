//! Per-job temp file bookkeeping.
//!
//! [`JobFiles`] reserves a unique input/output path pair inside the shared
//! temp directory, stages the source there, and delivers the result. It does
//! not delete anything itself; callers hand [`JobFiles::paths`] to a
//! [`CleanupPool`](crate::pool::CleanupPool) once the job is over, whatever
//! its outcome.

use std::path::{Path, PathBuf};

use vm_core::JobId;

const DEFAULT_INPUT_EXT: &str = "mp4";
const OUTPUT_EXT: &str = "mp4";

#[derive(Debug, Clone)]
pub struct JobFiles {
    job_id: JobId,
    input: PathBuf,
    output: PathBuf,
}

impl JobFiles {
    /// Reserve `input_<job>.<ext>` and `output_<job>.mp4` under `temp_dir`,
    /// creating the directory if needed. The input extension is taken from
    /// `original_name` when it has a plain alphanumeric one.
    pub fn allocate(
        temp_dir: &Path,
        job_id: JobId,
        original_name: Option<&Path>,
    ) -> vm_core::Result<Self> {
        std::fs::create_dir_all(temp_dir)?;

        let ext = original_name
            .and_then(|n| n.extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| DEFAULT_INPUT_EXT.to_string());

        Ok(Self {
            job_id,
            input: temp_dir.join(format!("input_{job_id}.{ext}")),
            output: temp_dir.join(format!("output_{job_id}.{OUTPUT_EXT}")),
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Both paths, for scheduling cleanup.
    pub fn paths(&self) -> Vec<PathBuf> {
        vec![self.input.clone(), self.output.clone()]
    }

    /// Copy the source file into the reserved input path.
    pub async fn stage_input(&self, source: &Path) -> vm_core::Result<u64> {
        let bytes = tokio::fs::copy(source, &self.input).await.map_err(|e| {
            vm_core::Error::tool(
                "workspace",
                format!("failed to stage {}: {e}", source.display()),
            )
        })?;
        tracing::debug!(job_id = %self.job_id, bytes, "Staged input at {}", self.input.display());
        Ok(bytes)
    }

    /// Move the finished output to `dest`.
    ///
    /// Tries a rename first (same filesystem) and falls back to a copy; the
    /// leftover output is removed later by cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if the output file does not exist or cannot be moved.
    pub async fn deliver(&self, dest: &Path) -> vm_core::Result<PathBuf> {
        if !tokio::fs::try_exists(&self.output).await.unwrap_or(false) {
            return Err(vm_core::Error::tool(
                "workspace",
                format!("output file does not exist: {}", self.output.display()),
            ));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        if tokio::fs::rename(&self.output, dest).await.is_err() {
            tokio::fs::copy(&self.output, dest).await.map_err(|e| {
                vm_core::Error::tool(
                    "workspace",
                    format!("failed to copy output to destination: {e}"),
                )
            })?;
        }

        Ok(dest.to_path_buf())
    }
}
