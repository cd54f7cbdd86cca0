mod gallery_dl;
mod http;
mod photo;
mod platform;
mod strategy;
mod tikwm;
mod types;
mod ytdlp;

pub use platform::{extract_url, Platform};
pub use strategy::{ChainStrategy, Fallback, FetchStrategy, Fetcher, UnsupportedStrategy};
pub use types::{Artifact, FetchError, FetchRequest};

use crate::config::FetchConfig;
use crate::queue::Tier;
use gallery_dl::GalleryDlFetcher;
use photo::PhotoPostFetcher;
use std::path::Path;
use std::sync::Arc;
use tikwm::TikwmFetcher;
use tracing::{info, warn};
use url::Url;
use ytdlp::YtDlpFetcher;

/// Ordered set of per-platform strategies. The first one that claims a URL handles it.
pub struct StrategySet {
    strategies: Vec<Arc<dyn FetchStrategy>>,
}

impl StrategySet {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = http::build_client(config)?;

        let ytdlp: Arc<dyn Fetcher> = Arc::new(YtDlpFetcher::new(config));
        let photo: Arc<dyn Fetcher> = Arc::new(PhotoPostFetcher::new(client.clone(), config));
        let tikwm: Arc<dyn Fetcher> = Arc::new(TikwmFetcher::new(client.clone(), config));
        let gallery_dl: Arc<dyn Fetcher> = Arc::new(GalleryDlFetcher::new(client, config));

        let tiktok = ChainStrategy::new("tiktok", Platform::TikTok, ytdlp.clone())
            .with_fallback(Fallback::on_no_video(photo.clone()))
            .with_fallback(Fallback::always(tikwm));

        let instagram = ChainStrategy::new("instagram", Platform::Instagram, ytdlp)
            .with_fallback(Fallback::on_no_video(photo))
            .with_fallback(Fallback::always(gallery_dl));

        info!("Media strategies initialized - unsupported, tiktok, instagram");

        Ok(Self::new(vec![
            Arc::new(UnsupportedStrategy),
            Arc::new(tiktok),
            Arc::new(instagram),
        ]))
    }

    /// Fetches `url` into `workdir` with the first strategy that claims it.
    ///
    /// URLs no strategy recognises yield [`Artifact::Unsupported`] without any network call.
    pub async fn fetch(&self, url: &str, tier: Tier, workdir: &Path) -> Result<Artifact, FetchError> {
        let parsed = match Url::parse(url.trim()) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
            _ => {
                return Ok(Artifact::Unsupported {
                    reason: "That does not look like a valid link.".to_string(),
                })
            }
        };

        let Some(strategy) = self.strategies.iter().find(|s| s.classify(&parsed)) else {
            return Ok(Artifact::Unsupported {
                reason: format!(
                    "Links from {} are not supported.",
                    parsed.host_str().unwrap_or("this site")
                ),
            });
        };

        info!(strategy = strategy.name(), "Starting download for URL: {}", parsed);
        strategy
            .fetch(&FetchRequest::new(parsed, tier), workdir)
            .await
    }

    pub async fn test_setup(&self) {
        info!("Testing media downloader setup...");

        let ytdlp_available = YtDlpFetcher::test_availability().await;
        let gallery_dl_available = GalleryDlFetcher::test_availability().await;

        if !ytdlp_available {
            warn!("yt-dlp is not available, only the fallback methods will work");
        }
        if !gallery_dl_available {
            warn!("gallery-dl is not available, Instagram has one fallback less");
        }
    }
}
