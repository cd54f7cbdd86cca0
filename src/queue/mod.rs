//! Two-band priority queue of pending download jobs.
//!
//! Diamond jobs are inserted at the head, everything else at the tail. The queue is the
//! only state shared between the submission side (chat layer) and the workers, so it is
//! guarded by a single mutex that is never held across an await point.

mod job;

pub use job::{DeliveryTarget, Job, JobId, Tier, UserId};

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    notify: Notify,
    warn_threshold: usize,
}

impl JobQueue {
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            warn_threshold,
        }
    }

    /// Submission API: build a job for the request and enqueue it.
    ///
    /// The tier is taken as-is; callers resolve it from the quota gate at submission time,
    /// so a later tier change never reorders a job that is already waiting.
    pub fn submit(
        &self,
        requester: UserId,
        target: DeliveryTarget,
        url: impl Into<String>,
        tier: Tier,
    ) -> JobId {
        let job = Job::new(requester, target, url, tier);
        let id = job.id();
        self.enqueue(job);
        id
    }

    pub fn enqueue(&self, job: Job) {
        let job_id = job.id();
        let tier = job.tier();

        let len = {
            let mut jobs = self.lock();
            if tier.is_priority() {
                jobs.push_front(job);
            } else {
                jobs.push_back(job);
            }
            jobs.len()
        };

        info!(%job_id, %tier, queue_len = len, "Job queued");
        if len > self.warn_threshold {
            warn!(
                queue_len = len,
                threshold = self.warn_threshold,
                "Download queue is growing"
            );
        }

        self.notify.notify_one();
    }

    /// Pops the front job without waiting.
    pub fn dequeue(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    /// Pops the front job, waiting up to `poll_interval` for a submission if the queue is empty.
    ///
    /// Returns `None` when nothing arrived in time so the caller can check for shutdown.
    pub async fn next(&self, poll_interval: Duration) -> Option<Job> {
        if let Some(job) = self.dequeue() {
            return Some(job);
        }

        if tokio::time::timeout(poll_interval, self.notify.notified())
            .await
            .is_err()
        {
            debug!("Queue poll interval elapsed");
        }

        self.dequeue()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 1-based position of a job, used to tell the requester where they are in line.
    pub fn position(&self, id: JobId) -> Option<usize> {
        self.lock()
            .iter()
            .position(|job| job.id() == id)
            .map(|index| index + 1)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Job>> {
        // A panic while holding the lock cannot leave the deque half-modified.
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(100)
    }
}
