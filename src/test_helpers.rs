//! Test doubles shared by the unit tests.

use crate::delivery::{DeliveryError, DeliveryReport, DeliverySink, FailureKind};
use crate::media::{Artifact, FetchError, FetchRequest, Fetcher};
use crate::queue::{DeliveryTarget, Tier, UserId};
use crate::quota::QuotaGate;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Behaviour = Box<dyn Fn(&Path) -> Result<Artifact, FetchError> + Send + Sync>;

pub struct StubFetcher {
    name: &'static str,
    behaviour: Behaviour,
    calls: AtomicUsize,
    last_workdir: Mutex<Option<PathBuf>>,
}

impl StubFetcher {
    pub fn with_fn(
        name: &'static str,
        f: impl Fn(&Path) -> Result<Artifact, FetchError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            behaviour: Box::new(f),
            calls: AtomicUsize::new(0),
            last_workdir: Mutex::new(None),
        })
    }

    pub fn ok(name: &'static str, artifact: Artifact) -> Arc<Self> {
        Self::with_fn(name, move |_| Ok(artifact.clone()))
    }

    pub fn err(name: &'static str, f: impl Fn() -> FetchError + Send + Sync + 'static) -> Arc<Self> {
        Self::with_fn(name, move |_| Err(f()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_workdir(&self) -> Option<PathBuf> {
        self.last_workdir.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_workdir.lock().unwrap() = Some(workdir.to_path_buf());
        (self.behaviour)(workdir)
    }
}

/// Quota gate with a fixed answer that counts how it was used.
#[derive(Default)]
pub struct StubQuota {
    deny: AtomicBool,
    pub checks: AtomicUsize,
    pub recorded: AtomicUsize,
    tier: Mutex<Tier>,
}

impl StubQuota {
    pub fn allowing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        let quota = Self::default();
        quota.deny.store(true, Ordering::SeqCst);
        Arc::new(quota)
    }

    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaGate for StubQuota {
    async fn can_consume(&self, _user: UserId) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        !self.deny.load(Ordering::SeqCst)
    }

    async fn record_consumption(&self, _user: UserId) {
        self.recorded.fetch_add(1, Ordering::SeqCst);
    }

    async fn current_tier(&self, _user: UserId) -> Tier {
        *self.tier.lock().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Artifact(DeliveryReport),
    Failure(FailureKind, String),
}

/// Sink that "sends" by checking the files exist, and records every call.
#[derive(Default)]
pub struct RecordingSink {
    fail_sends: AtomicBool,
    pub delivered: Mutex<Vec<(DeliveryTarget, Delivered)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let sink = Self::default();
        sink.fail_sends.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn calls(&self) -> Vec<(DeliveryTarget, Delivered)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver_artifact(
        &self,
        target: DeliveryTarget,
        artifact: &Artifact,
    ) -> Result<DeliveryReport, DeliveryError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("connection reset".into()));
        }

        let mut report = DeliveryReport::default();
        match artifact {
            Artifact::Video { path, .. } => {
                if path.exists() {
                    report.videos_sent = 1;
                }
            }
            Artifact::PhotoSet { images, audio, .. } => {
                report.images_sent = images.iter().filter(|p| p.exists()).count();
                report.audio_sent = audio.iter().filter(|p| p.exists()).count();
            }
            Artifact::Unsupported { .. } => return Err(DeliveryError::Empty("unsupported")),
        }

        self.delivered
            .lock()
            .unwrap()
            .push((target, Delivered::Artifact(report)));
        Ok(report)
    }

    async fn deliver_failure(&self, target: DeliveryTarget, kind: FailureKind, detail: &str) {
        self.delivered
            .lock()
            .unwrap()
            .push((target, Delivered::Failure(kind, detail.to_string())));
    }
}
