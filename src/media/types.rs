use crate::queue::Tier;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Media fetched for a job. Backing files live in the job's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Video {
        path: PathBuf,
        size_bytes: u64,
    },
    PhotoSet {
        images: Vec<PathBuf>,
        audio: Option<PathBuf>,
        /// Images that were located but could not be downloaded.
        missing: usize,
    },
    Unsupported {
        reason: String,
    },
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Video { .. } => "video",
            Artifact::PhotoSet { .. } => "photo_set",
            Artifact::Unsupported { .. } => "unsupported",
        }
    }
}

/// What a fetcher is asked to retrieve.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub tier: Tier,
}

impl FetchRequest {
    pub fn new(url: Url, tier: Tier) -> Self {
        Self { url, tier }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no playable video stream: {0}")]
    NoVideoStream(String),

    #[error("no media found (the post may be private or removed)")]
    NoMediaFound,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("extractor error: {0}")]
    Extractor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("all methods failed: {}", .0.join(". "))]
    Exhausted(Vec<String>),
}

impl FetchError {
    /// The source was reachable but held nothing we can send.
    pub fn is_no_media(&self) -> bool {
        matches!(self, FetchError::NoMediaFound | FetchError::NoVideoStream(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err.to_string())
    }
}
