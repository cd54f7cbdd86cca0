//! Download workers.
//!
//! Each worker pulls one job at a time from the shared [`JobQueue`], checks the quota,
//! fetches the media into a private workspace, hands the result to the delivery sink and
//! removes the workspace. A failing job is reported to its requester and never takes the
//! worker down with it.

mod metrics;
mod workspace;

pub use metrics::Metrics;
use workspace::Workspace;

use crate::config::QueueConfig;
use crate::delivery::{DeliverySink, FailureKind};
use crate::media::{Artifact, FetchError, StrategySet};
use crate::queue::{Job, JobQueue};
use crate::quota::QuotaGate;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How a job ended. Every variant corresponds to exactly one delivery to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    QuotaExceeded,
    Unsupported,
    FetchFailed,
    NoMediaFound,
    DeliveryFailed,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobOutcome::Delivered => "delivered",
            JobOutcome::QuotaExceeded => "quota_exceeded",
            JobOutcome::Unsupported => "unsupported",
            JobOutcome::FetchFailed => "fetch_failed",
            JobOutcome::NoMediaFound => "no_media_found",
            JobOutcome::DeliveryFailed => "delivery_failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub workers: usize,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub temp_root: Option<PathBuf>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for WorkerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            poll_interval: config.poll_interval(),
            job_timeout: config.job_timeout(),
            temp_root: config.temp_root.clone(),
        }
    }
}

pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub quota: Arc<dyn QuotaGate>,
    pub strategies: Arc<StrategySet>,
    pub sink: Arc<dyn DeliverySink>,
    pub settings: WorkerSettings,
    pub metrics: Metrics,
}

/// Starts one worker per configured slot.
pub fn spawn_workers(ctx: Arc<WorkerContext>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
    (0..ctx.settings.workers)
        .map(|index| tokio::spawn(run_worker(index, ctx.clone(), cancel.clone())))
        .collect()
}

pub async fn run_worker(index: usize, ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    info!(worker = index, "Download worker started");

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(worker = index, "Worker cancelled");
                break;
            }
            job = ctx.queue.next(ctx.settings.poll_interval) => job,
        };

        let Some(job) = job else {
            continue;
        };

        let outcome = process_job(&ctx, job).await;
        ctx.metrics.record(outcome);
    }

    info!(worker = index, "Download worker stopped");
}

/// Runs one job to completion: quota check, fetch, delivery, cleanup.
#[instrument(skip_all, fields(job_id = %job.id(), user = %job.requester(), tier = %job.tier()))]
pub async fn process_job(ctx: &WorkerContext, job: Job) -> JobOutcome {
    let waited_ms = (Utc::now() - job.submitted_at()).num_milliseconds();
    info!(url = job.url(), waited_ms, "Processing job");

    if !ctx.quota.try_consume(job.requester()).await {
        info!("Daily quota exhausted, discarding job");
        ctx.sink
            .deliver_failure(job.target(), FailureKind::QuotaExceeded, "")
            .await;
        return JobOutcome::QuotaExceeded;
    }

    let mut workspace = match Workspace::create(ctx.settings.temp_root.as_deref()) {
        Ok(workspace) => workspace,
        Err(e) => {
            error!("Failed to create workspace: {}", e);
            ctx.sink
                .deliver_failure(
                    job.target(),
                    FailureKind::FetchFailed,
                    &format!("could not prepare a download directory: {e}"),
                )
                .await;
            return JobOutcome::FetchFailed;
        }
    };

    let outcome = fetch_and_deliver(ctx, &job, workspace.path()).await;

    if let Err(e) = workspace.cleanup() {
        warn!("Failed to remove workspace {}: {}", workspace.path().display(), e);
    }

    info!(%outcome, "Job finished");
    outcome
}

async fn fetch_and_deliver(ctx: &WorkerContext, job: &Job, workdir: &Path) -> JobOutcome {
    let target = job.target();

    let artifact = match guarded_fetch(ctx, job, workdir).await {
        Ok(Artifact::Unsupported { reason }) => {
            info!(%reason, "Unsupported platform");
            ctx.sink
                .deliver_failure(target, FailureKind::UnsupportedPlatform, &reason)
                .await;
            return JobOutcome::Unsupported;
        }
        Ok(artifact) => artifact,
        Err(e) if e.is_no_media() => {
            warn!("No media found: {}", e);
            ctx.sink
                .deliver_failure(target, FailureKind::NoMediaFound, &e.to_string())
                .await;
            return JobOutcome::NoMediaFound;
        }
        Err(e) => {
            error!("Failed to download media: {}", e);
            ctx.sink
                .deliver_failure(target, FailureKind::FetchFailed, &e.to_string())
                .await;
            return JobOutcome::FetchFailed;
        }
    };

    match ctx.sink.deliver_artifact(target, &artifact).await {
        Ok(report) => {
            info!(
                kind = artifact.kind(),
                videos = report.videos_sent,
                images = report.images_sent,
                audio = report.audio_sent,
                "Media delivered"
            );
            JobOutcome::Delivered
        }
        Err(e) => {
            error!("Failed to send media: {}", e);
            ctx.sink
                .deliver_failure(target, FailureKind::DeliveryFailed, &e.to_string())
                .await;
            JobOutcome::DeliveryFailed
        }
    }
}

/// Fetch bounded by the job timeout, with panics turned into errors.
async fn guarded_fetch(ctx: &WorkerContext, job: &Job, workdir: &Path) -> Result<Artifact, FetchError> {
    let fetch = AssertUnwindSafe(ctx.strategies.fetch(job.url(), job.tier(), workdir)).catch_unwind();

    match tokio::time::timeout(ctx.settings.job_timeout, fetch).await {
        Err(_) => Err(FetchError::Timeout(ctx.settings.job_timeout)),
        Ok(Err(panic)) => Err(FetchError::Extractor(format!(
            "fetcher panicked: {}",
            panic_message(panic.as_ref())
        ))),
        Ok(Ok(result)) => result,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
