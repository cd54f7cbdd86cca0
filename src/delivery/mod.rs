//! Contract for sending results back to the requester.
//!
//! The worker calls a [`DeliverySink`] exactly once per finished job: either with the fetched
//! [`Artifact`] or with a [`FailureKind`]. How the bytes travel is up to the transport.

use crate::media::Artifact;
use crate::queue::DeliveryTarget;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    QuotaExceeded,
    UnsupportedPlatform,
    FetchFailed,
    NoMediaFound,
    DeliveryFailed,
}

impl FailureKind {
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::QuotaExceeded => "❌ Daily download limit reached. Try again tomorrow.",
            FailureKind::UnsupportedPlatform => "❌ This platform is not supported.",
            FailureKind::FetchFailed => "❌ Download failed.",
            FailureKind::NoMediaFound => {
                "❌ No media found. The post may be private or removed."
            }
            FailureKind::DeliveryFailed => "❌ The media was downloaded but could not be sent.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::UnsupportedPlatform => "unsupported_platform",
            FailureKind::FetchFailed => "fetch_failed",
            FailureKind::NoMediaFound => "no_media_found",
            FailureKind::DeliveryFailed => "delivery_failed",
        };
        f.write_str(name)
    }
}

/// What a sink actually sent for an artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub videos_sent: usize,
    pub images_sent: usize,
    pub audio_sent: usize,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("file too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nothing to deliver: {0}")]
    Empty(&'static str),
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver_artifact(
        &self,
        target: DeliveryTarget,
        artifact: &Artifact,
    ) -> Result<DeliveryReport, DeliveryError>;

    async fn deliver_failure(&self, target: DeliveryTarget, kind: FailureKind, detail: &str);
}

/// Fails with [`DeliveryError::TooLarge`] when the file exceeds the transport's upload limit.
pub async fn ensure_within_limit(path: &Path, limit: u64) -> Result<u64, DeliveryError> {
    let size = tokio::fs::metadata(path).await?.len();
    if size > limit {
        return Err(DeliveryError::TooLarge { size, limit });
    }
    Ok(size)
}
