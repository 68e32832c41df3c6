//! Job runner: asynchronous acceptance and bounded execution of jobs.
//!
//! [`JobRunner::submit`] validates a request, registers the job and returns
//! its id before any transform runs. Execution happens on a spawned task
//! that first waits for a worker permit, so at most `max_concurrent_jobs`
//! pipelines run at once. Every failure inside a job ends in the `error`
//! state; nothing propagates out of the task.
//!
//! Progress crosses from the blocking transform threads to the async side
//! over an unbounded channel. A forwarder task drains it in order, stores
//! each value in the registry and publishes the stored value, so published
//! progress never goes backwards.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;
use upscaler_core::codec::{self, OutputFormat};
use upscaler_core::error::CoreError;
use upscaler_core::job_events::{MESSAGE_COMPLETED, MESSAGE_STARTING};
use upscaler_core::naming::output_filename;
use upscaler_core::progress::ProgressSink;
use upscaler_core::raster::RasterImage;
use upscaler_core::types::{JobId, ResampleMode, Scale};
use upscaler_core::validation::{
    check_output_size, resolve_resample_mode, validate_scales, DEFAULT_MAX_OUTPUT_PIXELS,
};
use upscaler_engine::EngineCache;
use upscaler_events::{ProgressBroadcaster, ProgressEvent};

use crate::error::PipelineError;
use crate::registry::{JobRecord, JobRegistry, JobStatus};
use crate::stages::PipelineRunner;
use crate::storage::{ArtifactHandle, ArtifactStore};

/// Default worker-pool size.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub max_concurrent_jobs: usize,
    /// Substituted for unrecognised resampling modes.
    pub default_resample_mode: ResampleMode,
    /// Upper bound on the pixel count of a job's final output.
    pub max_output_pixels: u64,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            default_resample_mode: ResampleMode::default(),
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }
}

/// An upscale request as received from the transport layer.
///
/// Scales and mode are raw; validation happens in [`JobRunner::submit`].
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: Option<String>,
    pub filename: String,
    pub image: RasterImage,
    pub scales: Vec<String>,
    pub resample_mode: Option<String>,
    pub show_progress: bool,
}

/// A completed job's downloadable result.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

struct Job {
    job_id: JobId,
    original_filename: String,
    scales: Vec<Scale>,
    mode: ResampleMode,
    show_progress: bool,
}

/// Shared collaborators handed to each job task.
#[derive(Clone)]
struct JobContext {
    registry: Arc<JobRegistry>,
    broadcaster: Arc<ProgressBroadcaster>,
    store: Arc<dyn ArtifactStore>,
    pipeline: PipelineRunner,
}

/// Owns the job lifecycle. Construct once at startup and share via `Arc`.
pub struct JobRunner {
    ctx: JobContext,
    config: JobRunnerConfig,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Ids whose pipeline task has not returned yet, including cleaned-up ones.
    live: Arc<Mutex<HashSet<JobId>>>,
}

/// Holds a job id in the live set until the job's task ends.
struct LiveGuard {
    live: Arc<Mutex<HashSet<JobId>>>,
    job_id: JobId,
}

impl LiveGuard {
    fn claim(live: &Arc<Mutex<HashSet<JobId>>>, job_id: &JobId) -> Result<Self, CoreError> {
        let mut ids = live.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(job_id.clone()) {
            return Err(CoreError::Conflict(format!("Job {job_id} is still running")));
        }
        Ok(Self {
            live: Arc::clone(live),
            job_id: job_id.clone(),
        })
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}

impl JobRunner {
    pub fn new(
        config: JobRunnerConfig,
        cache: Arc<EngineCache>,
        broadcaster: Arc<ProgressBroadcaster>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            ctx: JobContext {
                registry: Arc::new(JobRegistry::new()),
                broadcaster,
                store,
                pipeline: PipelineRunner::new(cache),
            },
            config,
            permits,
            tracker: TaskTracker::new(),
            live: Arc::default(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.ctx.registry
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.ctx.broadcaster
    }

    pub fn cache(&self) -> &Arc<EngineCache> {
        self.ctx.pipeline.cache()
    }

    pub fn config(&self) -> &JobRunnerConfig {
        &self.config
    }

    /// Validate and enqueue a job, returning its id immediately.
    ///
    /// Rejects the request before registration when no valid scale remains,
    /// the output would exceed `max_output_pixels`, the supplied id is
    /// malformed or taken, or the runner is shutting down. An id stays taken
    /// after cleanup until its pipeline task has returned.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, CoreError> {
        if self.tracker.is_closed() {
            return Err(CoreError::Conflict("Job runner is shutting down".into()));
        }

        let scales = validate_scales(&request.scales)?;
        check_output_size(
            request.image.width(),
            request.image.height(),
            &scales,
            self.config.max_output_pixels,
        )?;
        let mode = resolve_resample_mode(
            request.resample_mode.as_deref(),
            self.config.default_resample_mode,
        );
        let job_id = match request.job_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => JobId::parse(raw)?,
            _ => JobId::generate(),
        };

        let guard = LiveGuard::claim(&self.live, &job_id)?;
        let record = JobRecord::new(job_id.clone(), request.filename.clone(), scales.clone(), mode);
        self.ctx.registry.insert(record).await?;

        tracing::info!(
            job_id = %job_id,
            filename = %request.filename,
            scales = ?scales.iter().map(|s| s.factor()).collect::<Vec<_>>(),
            mode = %mode,
            width = request.image.width(),
            height = request.image.height(),
            "Upscale job accepted",
        );

        let image = request.image;
        let job = Job {
            job_id: job_id.clone(),
            original_filename: request.filename,
            scales,
            mode,
            show_progress: request.show_progress,
        };
        let ctx = self.ctx.clone();
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                ctx.fail(&job.job_id, job.show_progress, "Job runner is shutting down")
                    .await;
                return;
            };
            ctx.execute(job, image).await;
        });

        Ok(job_id)
    }

    /// Current snapshot of a job.
    pub async fn status(&self, job_id: &JobId) -> Result<JobRecord, CoreError> {
        self.ctx.registry.get(job_id).await
    }

    /// Result bytes of a completed job.
    pub async fn result(&self, job_id: &JobId) -> Result<JobResult, CoreError> {
        let record = self.ctx.registry.get(job_id).await?;
        if record.status != JobStatus::Completed {
            return Err(CoreError::NotReady("Job not completed".into()));
        }
        let handle = record.result.ok_or_else(|| CoreError::NotFound {
            entity: "Artifact",
            id: job_id.to_string(),
        })?;
        let bytes = self.ctx.store.load(&handle).await?;
        Ok(JobResult {
            content_type: codec::content_type_for(&handle.filename),
            filename: handle.filename,
            bytes,
        })
    }

    /// Forget a job in any state, deleting its artifacts and closing its
    /// progress subscription. A still-running pipeline finishes unobserved.
    pub async fn cleanup(&self, job_id: &JobId) -> Result<(), CoreError> {
        let record = self
            .ctx
            .registry
            .remove(job_id)
            .await
            .ok_or_else(|| CoreError::job_not_found(job_id.as_str()))?;

        if let Err(e) = self.ctx.store.delete_job(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to delete job artifacts");
        }
        self.ctx.broadcaster.unsubscribe(job_id).await;

        tracing::info!(job_id = %job_id, status = %record.status, "Job cleaned up");
        Ok(())
    }

    /// Whether a pipeline task for `job_id` is still alive, even if the job
    /// itself was already cleaned up.
    pub fn is_running(&self, job_id: &JobId) -> bool {
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(job_id)
    }

    /// Number of jobs accepted or processing.
    pub async fn active_jobs(&self) -> usize {
        self.ctx.registry.active_count().await
    }

    /// Stop accepting jobs and wait up to `timeout` for running ones.
    ///
    /// Jobs still waiting for a worker end in `error` without running.
    /// Returns `true` when every job finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        self.permits.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        if drained {
            tracing::info!("All upscale jobs finished");
        } else {
            tracing::warn!(
                remaining = self.tracker.len(),
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout reached with jobs still running",
            );
        }
        drained
    }
}

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

/// Progress sink usable from blocking threads.
struct ChannelProgress(mpsc::UnboundedSender<(f64, String)>);

impl ProgressSink for ChannelProgress {
    fn report(&self, fraction: f64, message: &str) {
        // The forwarder only stops once every sender is gone.
        let _ = self.0.send((fraction, message.to_string()));
    }
}

impl JobContext {
    async fn execute(self, job: Job, image: RasterImage) {
        let job_id = job.job_id.clone();
        if let Err(e) = self.registry.mark_processing(&job_id, MESSAGE_STARTING).await {
            tracing::debug!(job_id = %job_id, error = %e, "Job removed before start");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(self.clone().forward_progress(
            job_id.clone(),
            job.show_progress,
            rx,
        ));
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgress(tx));
        sink.report(0.0, MESSAGE_STARTING);

        let outcome = self
            .pipeline
            .run(&job.scales, job.mode, image, Arc::clone(&sink))
            .await;
        drop(sink);
        if let Err(e) = forwarder.await {
            tracing::warn!(job_id = %job_id, error = %e, "Progress forwarder failed");
        }

        match outcome {
            Ok(output) => self.finish(&job, output).await,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Upscale job failed");
                self.fail(&job_id, job.show_progress, &e.to_string()).await;
            }
        }
    }

    async fn finish(&self, job: &Job, output: RasterImage) {
        let job_id = &job.job_id;
        let saved = match self.save(job, output).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to save upscale result");
                self.fail(job_id, job.show_progress, &e.to_string()).await;
                return;
            }
        };

        if let Err(e) = self.registry.complete(job_id, saved, MESSAGE_COMPLETED).await {
            tracing::info!(job_id = %job_id, error = %e, "Job cleaned up while processing, discarding result");
            if let Err(e) = self.store.delete_job(job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to delete orphaned artifact");
            }
            return;
        }

        tracing::info!(job_id = %job_id, "Upscale job completed");
        if job.show_progress {
            self.broadcaster
                .publish(ProgressEvent::completed(job_id.clone(), MESSAGE_COMPLETED))
                .await;
        }
    }

    async fn save(
        &self,
        job: &Job,
        output: RasterImage,
    ) -> Result<ArtifactHandle, PipelineError> {
        let filename = output_filename(&job.original_filename, &job.scales, job.mode);
        let format = OutputFormat::from_filename(&filename);
        let bytes = tokio::task::spawn_blocking(move || codec::encode(&output, format)).await??;
        Ok(self.store.save(&job.job_id, &filename, bytes).await?)
    }

    async fn fail(&self, job_id: &JobId, show_progress: bool, error: &str) {
        if let Err(e) = self.registry.fail(job_id, error).await {
            tracing::debug!(job_id = %job_id, error = %e, "Dropping failure of a removed job");
            return;
        }
        if show_progress {
            let progress = self
                .registry
                .get(job_id)
                .await
                .map(|r| r.progress)
                .unwrap_or_default();
            self.broadcaster
                .publish(ProgressEvent::failed(job_id.clone(), progress, error))
                .await;
        }
    }

    /// Drain progress reports in order until every sender is dropped.
    async fn forward_progress(
        self,
        job_id: JobId,
        show_progress: bool,
        mut rx: mpsc::UnboundedReceiver<(f64, String)>,
    ) {
        while let Some((fraction, message)) = rx.recv().await {
            let stored = match self.registry.update_progress(&job_id, fraction, &message).await {
                Ok(stored) => stored,
                // Removed by cleanup; keep draining so senders never block.
                Err(_) => continue,
            };
            if show_progress {
                self.broadcaster
                    .publish(ProgressEvent::progress(job_id.clone(), stored, message))
                    .await;
            }
        }
    }
}
