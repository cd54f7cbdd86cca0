use super::platform::Platform;
use super::types::{Artifact, FetchError, FetchRequest};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// A single retrieval method: an extractor, a secondary API, a page scraper.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable name of the fetcher
    fn name(&self) -> &'static str;

    /// Fetch media for the request, writing any files into `workdir`
    async fn fetch(&self, request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError>;
}

/// Per-platform retrieval: decides whether it owns a URL, then fetches it.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, url: &Url) -> bool;

    async fn fetch(&self, request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError>;
}

/// When a fallback step is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Always,
    /// Only after the previous step reported that the post has no video stream.
    NoVideoStream,
}

pub struct Fallback {
    fetcher: Arc<dyn Fetcher>,
    when: Trigger,
}

impl Fallback {
    pub fn always(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            when: Trigger::Always,
        }
    }

    pub fn on_no_video(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            when: Trigger::NoVideoStream,
        }
    }
}

/// Primary fetcher followed by an ordered list of fallbacks.
pub struct ChainStrategy {
    name: String,
    platform: Platform,
    primary: Arc<dyn Fetcher>,
    fallbacks: Vec<Fallback>,
}

impl ChainStrategy {
    pub fn new(name: impl Into<String>, platform: Platform, primary: Arc<dyn Fetcher>) -> Self {
        Self {
            name: name.into(),
            platform,
            primary,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallbacks.push(fallback);
        self
    }
}

#[async_trait]
impl FetchStrategy for ChainStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, url: &Url) -> bool {
        Platform::classify(url) == self.platform
    }

    async fn fetch(&self, request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError> {
        let mut failures: Vec<(&'static str, FetchError)> = Vec::new();

        let steps = std::iter::once((&self.primary, Trigger::Always))
            .chain(self.fallbacks.iter().map(|f| (&f.fetcher, f.when)));

        for (fetcher, when) in steps {
            if when == Trigger::NoVideoStream
                && !matches!(failures.last(), Some((_, FetchError::NoVideoStream(_))))
            {
                continue;
            }

            match fetcher.fetch(request, workdir).await {
                Ok(artifact) => {
                    info!(
                        strategy = %self.name,
                        fetcher = fetcher.name(),
                        kind = artifact.kind(),
                        "Fetch succeeded"
                    );
                    return Ok(artifact);
                }
                Err(e) => {
                    warn!(strategy = %self.name, fetcher = fetcher.name(), "Fetch failed: {}", e);
                    failures.push((fetcher.name(), e));
                }
            }
        }

        if failures.iter().all(|(_, e)| e.is_no_media()) {
            return Err(FetchError::NoMediaFound);
        }

        let causes = failures
            .iter()
            .map(|(name, e)| format!("{name}: {e}"))
            .collect();
        Err(FetchError::Exhausted(causes))
    }
}

/// Rejects disallowed platforms without touching the network.
pub struct UnsupportedStrategy;

pub const UNSUPPORTED_REASON: &str =
    "Downloads from this platform are not supported due to its terms of service.";

#[async_trait]
impl FetchStrategy for UnsupportedStrategy {
    fn name(&self) -> &str {
        "unsupported"
    }

    fn classify(&self, url: &Url) -> bool {
        Platform::classify(url).is_disallowed()
    }

    async fn fetch(&self, _request: &FetchRequest, _workdir: &Path) -> Result<Artifact, FetchError> {
        Ok(Artifact::Unsupported {
            reason: UNSUPPORTED_REASON.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Tier;
    use crate::test_helpers::StubFetcher;
    use std::path::PathBuf;

    fn request(url: &str) -> FetchRequest {
        FetchRequest::new(Url::parse(url).unwrap(), Tier::Standard)
    }

    fn video() -> Artifact {
        Artifact::Video {
            path: PathBuf::from("/tmp/video.mp4"),
            size_bytes: 2048,
        }
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallbacks() {
        let primary = StubFetcher::ok("primary", video());
        let fallback = StubFetcher::err("fallback", || FetchError::Http("unused".into()));
        let chain = ChainStrategy::new("tiktok", Platform::TikTok, primary.clone())
            .with_fallback(Fallback::always(fallback.clone()));

        let artifact = chain
            .fetch(&request("https://www.tiktok.com/@u/video/1"), Path::new("/tmp"))
            .await
            .unwrap();

        assert_eq!(artifact, video());
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_through_to_secondary() {
        let primary = StubFetcher::err("yt-dlp", || FetchError::Extractor("HTTP 403".into()));
        let photo = StubFetcher::err("photo-post", || FetchError::NoMediaFound);
        let secondary = StubFetcher::ok("tikwm", video());
        let chain = ChainStrategy::new("tiktok", Platform::TikTok, primary.clone())
            .with_fallback(Fallback::on_no_video(photo.clone()))
            .with_fallback(Fallback::always(secondary.clone()));

        let artifact = chain
            .fetch(&request("https://www.tiktok.com/@u/video/1"), Path::new("/tmp"))
            .await
            .unwrap();

        assert_eq!(artifact, video());
        assert_eq!(photo.calls(), 0, "photo step only runs when no video stream");
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_video_stream_triggers_photo_step() {
        let primary = StubFetcher::err("yt-dlp", || FetchError::NoVideoStream("slideshow".into()));
        let photos = Artifact::PhotoSet {
            images: vec![PathBuf::from("/tmp/img_01.jpg")],
            audio: None,
            missing: 0,
        };
        let photo = StubFetcher::ok("photo-post", photos.clone());
        let chain = ChainStrategy::new("tiktok", Platform::TikTok, primary)
            .with_fallback(Fallback::on_no_video(photo.clone()));

        let artifact = chain
            .fetch(&request("https://www.tiktok.com/@u/photo/1"), Path::new("/tmp"))
            .await
            .unwrap();

        assert_eq!(artifact, photos);
        assert_eq!(photo.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_no_media_reports_no_media_found() {
        let primary = StubFetcher::err("yt-dlp", || FetchError::NoVideoStream("none".into()));
        let photo = StubFetcher::err("photo-post", || FetchError::NoMediaFound);
        let chain = ChainStrategy::new("tiktok", Platform::TikTok, primary)
            .with_fallback(Fallback::on_no_video(photo));

        let err = chain
            .fetch(&request("https://www.tiktok.com/@u/photo/1"), Path::new("/tmp"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NoMediaFound));
    }

    #[tokio::test]
    async fn test_exhausted_lists_each_attempted_fetcher() {
        let primary = StubFetcher::err("yt-dlp", || FetchError::Extractor("boom".into()));
        let skipped = StubFetcher::err("photo-post", || FetchError::NoMediaFound);
        let secondary = StubFetcher::err("tikwm", || FetchError::Http("HTTP 500".into()));
        let chain = ChainStrategy::new("tiktok", Platform::TikTok, primary)
            .with_fallback(Fallback::on_no_video(skipped))
            .with_fallback(Fallback::always(secondary));

        let err = chain
            .fetch(&request("https://www.tiktok.com/@u/video/1"), Path::new("/tmp"))
            .await
            .unwrap_err();

        match err {
            FetchError::Exhausted(causes) => {
                assert_eq!(causes.len(), 2);
                assert!(causes[0].starts_with("yt-dlp:"));
                assert!(causes[1].starts_with("tikwm:"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_chain_classifies_its_platform_only() {
        let chain = ChainStrategy::new(
            "instagram",
            Platform::Instagram,
            StubFetcher::ok("x", video()),
        );
        assert!(chain.classify(&Url::parse("https://www.instagram.com/p/abc/").unwrap()));
        assert!(!chain.classify(&Url::parse("https://www.tiktok.com/@u/video/1").unwrap()));
    }

    #[tokio::test]
    async fn test_unsupported_strategy() {
        let strategy = UnsupportedStrategy;
        let url = Url::parse("https://youtu.be/abc").unwrap();
        assert!(strategy.classify(&url));

        let artifact = strategy
            .fetch(&FetchRequest::new(url, Tier::Diamond), Path::new("/tmp"))
            .await
            .unwrap();
        assert!(matches!(artifact, Artifact::Unsupported { .. }));
    }
}
