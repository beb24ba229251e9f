//! End-to-end transformation jobs.
//!
//! [`TransformService`] plays the caller role around the core: it stages the
//! source under unique temp names, probes the source height when the aspect
//! filter needs it, compiles the plan, runs it under the supervisor, delivers
//! the output, and always schedules temp-file cleanup afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use vm_av::{
    CleanupPool, ExecutionResult, FfprobeProber, JobFiles, JobSlots, PipelineCompiler,
    ProcessSupervisor, SourceMedia, SupervisorOptions, ToolRegistry, TransformPlan,
};
use vm_core::config::Config;
use vm_core::{Error, JobId, Result, TransformParams};

/// One transformation request.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub params: TransformParams,
    /// Overrides the configured timeout.
    pub timeout: Option<Duration>,
    /// Seed for reproducible plans; entropy is used when `None`.
    pub seed: Option<u64>,
}

/// What happened to a request that got as far as execution.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub job_id: JobId,
    pub result: ExecutionResult,
    /// Where the output was delivered, when the run succeeded.
    pub delivered: Option<PathBuf>,
}

/// Composes compiler, supervisor, prober, and cleanup into one job flow.
#[derive(Debug, Clone)]
pub struct TransformService {
    compiler: PipelineCompiler,
    supervisor: ProcessSupervisor,
    cleanup: CleanupPool,
    prober: Option<FfprobeProber>,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl TransformService {
    /// Build a service from configuration, discovering ffmpeg and ffprobe.
    ///
    /// # Errors
    ///
    /// [`Error::Tool`] if ffmpeg cannot be found. A missing ffprobe is only
    /// an error once a job requests the aspect filter.
    pub fn from_config(config: &Config) -> Result<Self> {
        let tools = ToolRegistry::discover(&config.tools);
        let ffmpeg = tools.require("ffmpeg")?.path.clone();
        let ffprobe = tools.get("ffprobe").map(|t| t.path.clone());
        Ok(Self::new(config, ffmpeg, ffprobe))
    }

    /// Build a service with explicit tool paths.
    pub fn new(config: &Config, ffmpeg: PathBuf, ffprobe: Option<PathBuf>) -> Self {
        let slots = JobSlots::new(config.jobs.max_concurrent);
        let supervisor = ProcessSupervisor::new(ffmpeg, slots)
            .with_options(SupervisorOptions::from(&config.jobs));

        Self {
            compiler: PipelineCompiler::new(&config.encoding),
            supervisor,
            cleanup: CleanupPool::new(config.jobs.cleanup_workers),
            prober: ffprobe.map(FfprobeProber::new),
            temp_dir: config.jobs.temp_dir.clone(),
            timeout: config.jobs.timeout(),
        }
    }

    /// Run one request to completion.
    ///
    /// Parameter errors are returned before any file is touched. Every other
    /// path, including failures, schedules removal of the job's temp files.
    pub async fn process(&self, request: TransformRequest) -> Result<TransformOutcome> {
        request.params.validate()?;

        let job_id = JobId::new();
        let original_name = request.source.file_name().map(Path::new);
        let files = JobFiles::allocate(&self.temp_dir, job_id, original_name)?;
        tracing::info!(
            job_id = %job_id,
            source = %request.source.display(),
            speed = request.params.speed,
            pitch = request.params.pitch,
            "Transformation job started"
        );

        let outcome = self.process_staged(&request, &files).await;
        self.cleanup.schedule_removal(files.paths());

        match &outcome {
            Ok(o) if o.result.succeeded => {
                tracing::info!(
                    job_id = %job_id,
                    elapsed_ms = o.result.elapsed.as_millis() as u64,
                    "Transformation job finished"
                );
            }
            Ok(o) => {
                let reason = o
                    .result
                    .failure
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                tracing::warn!(job_id = %job_id, reason = %reason, "Transformation job failed");
            }
            Err(e) => tracing::error!(job_id = %job_id, "Transformation job error: {e}"),
        }

        outcome
    }

    async fn process_staged(
        &self,
        request: &TransformRequest,
        files: &JobFiles,
    ) -> Result<TransformOutcome> {
        files.stage_input(&request.source).await?;

        let height = if request.params.toggles.aspect {
            Some(self.probe_height(files.input()).await?)
        } else {
            None
        };
        let source = SourceMedia::new(files.input()).with_height(height);
        let plan = self.compile(&request.params, &source, files.output(), request.seed)?;

        let timeout = request.timeout.unwrap_or(self.timeout);
        let result = self.supervisor.run(plan, timeout).await;

        let delivered = if result.succeeded {
            Some(files.deliver(&request.destination).await?)
        } else {
            None
        };

        Ok(TransformOutcome {
            job_id: files.job_id(),
            result,
            delivered,
        })
    }

    /// Compile a plan, seeded when `seed` is given.
    pub fn compile(
        &self,
        params: &TransformParams,
        source: &SourceMedia,
        output: &Path,
        seed: Option<u64>,
    ) -> Result<TransformPlan> {
        match seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                self.compiler.compile_with_rng(params, source, output, &mut rng)
            }
            None => self.compiler.compile(params, source, output),
        }
    }

    async fn probe_height(&self, input: &Path) -> Result<u32> {
        let prober = self.prober.as_ref().ok_or_else(|| {
            Error::tool("ffprobe", "ffprobe is required for the aspect filter but was not found")
        })?;
        let dims = prober.video_dimensions(input).await?;
        tracing::debug!(width = dims.width, height = dims.height, "Probed source dimensions");
        Ok(dims.height)
    }

    /// Wait for all scheduled temp-file cleanups.
    pub async fn shutdown(&self) {
        self.cleanup.shutdown().await;
    }
}
