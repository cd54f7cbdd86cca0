use super::{
    http::{download_to_file, extension_from_url},
    strategy::Fetcher,
    types::{Artifact, FetchError, FetchRequest},
};
use crate::config::FetchConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv"];

pub struct GalleryDlFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_images: usize,
}

impl GalleryDlFetcher {
    pub fn new(client: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            client,
            timeout: config.extractor_timeout(),
            max_images: config.max_images,
        }
    }

    async fn extract_urls(&self, url: &str) -> Result<Vec<(String, String)>, FetchError> {
        debug!("Extracting media URLs with gallery-dl for: {}", url);

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("gallery-dl")
                .arg("--dump-json")
                .arg(url)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| FetchError::Timeout(self.timeout))??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Extractor(error.trim().to_string()));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        let media = parse_dump(&json_str)?;
        debug!("Found {} media URLs", media.len());
        Ok(media)
    }

    pub async fn test_availability() -> bool {
        match tokio::process::Command::new("gallery-dl")
            .arg("--version")
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ gallery-dl is available, version: {}", version.trim());
                true
            }
            Ok(_) => {
                warn!("❌ gallery-dl command failed");
                false
            }
            Err(e) => {
                warn!("❌ gallery-dl not found: {}", e);
                false
            }
        }
    }
}

/// Parses `--dump-json` output into `(url, extension)` pairs.
///
/// gallery-dl prints `[[type, metadata], [type, url, metadata], ...]`; only the
/// three-element entries carry a downloadable URL.
fn parse_dump(json_str: &str) -> Result<Vec<(String, String)>, FetchError> {
    let json: Value = serde_json::from_str(json_str)
        .map_err(|e| FetchError::Extractor(format!("invalid gallery-dl output: {e}")))?;

    let array = json
        .as_array()
        .ok_or_else(|| FetchError::Extractor("invalid gallery-dl output format".into()))?;

    let media: Vec<(String, String)> = array
        .iter()
        .filter_map(Value::as_array)
        .filter(|item| item.len() == 3)
        .filter_map(|item| {
            let url = item[1].as_str()?.to_string();
            let ext = item[2]["extension"]
                .as_str()
                .map(|e| e.to_lowercase())
                .unwrap_or_else(|| extension_from_url(&url, "jpg"));
            Some((url, ext))
        })
        .collect();

    if media.is_empty() {
        return Err(FetchError::NoMediaFound);
    }
    Ok(media)
}

#[async_trait]
impl Fetcher for GalleryDlFetcher {
    fn name(&self) -> &'static str {
        "gallery-dl"
    }

    async fn fetch(&self, request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError> {
        info!("Starting gallery-dl download for: {}", request.url);
        let media = self.extract_urls(request.url.as_str()).await?;

        // A post with a video is delivered as that video.
        if let Some((url, ext)) = media
            .iter()
            .find(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        {
            let path = workdir.join(format!("video.{ext}"));
            let size_bytes = download_to_file(&self.client, url, &path).await?;
            return Ok(Artifact::Video { path, size_bytes });
        }

        let mut images = Vec::new();
        let mut missing = 0;
        for (index, (url, ext)) in media.iter().take(self.max_images).enumerate() {
            let dest = workdir.join(format!("img_{:02}.{}", index + 1, ext));
            match download_to_file(&self.client, url, &dest).await {
                Ok(_) => images.push(dest),
                Err(e) => {
                    warn!("Failed to download {}: {}", url, e);
                    missing += 1;
                }
            }
        }

        if images.is_empty() {
            return Err(FetchError::Http("failed to download any media files".into()));
        }

        Ok(Artifact::PhotoSet {
            images,
            audio: None,
            missing,
        })
    }
}
