use super::JobOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome counters, logged at shutdown.
#[derive(Debug, Default)]
pub struct Metrics {
    delivered: AtomicU64,
    quota_exceeded: AtomicU64,
    unsupported: AtomicU64,
    fetch_failed: AtomicU64,
    no_media: AtomicU64,
    delivery_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::Delivered => &self.delivered,
            JobOutcome::QuotaExceeded => &self.quota_exceeded,
            JobOutcome::Unsupported => &self.unsupported,
            JobOutcome::FetchFailed => &self.fetch_failed,
            JobOutcome::NoMediaFound => &self.no_media,
            JobOutcome::DeliveryFailed => &self.delivery_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = %outcome, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            quota_exceeded: self.quota_exceeded.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
            fetch_failed: self.fetch_failed.load(Ordering::Relaxed),
            no_media: self.no_media.load(Ordering::Relaxed),
            delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub delivered: u64,
    pub quota_exceeded: u64,
    pub unsupported: u64,
    pub fetch_failed: u64,
    pub no_media: u64,
    pub delivery_failed: u64,
}

impl MetricsSnapshot {
    pub fn total(&self) -> u64 {
        self.delivered
            + self.quota_exceeded
            + self.unsupported
            + self.fetch_failed
            + self.no_media
            + self.delivery_failed
    }
}
