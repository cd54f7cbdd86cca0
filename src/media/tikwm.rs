//! Secondary TikTok API: resolves a direct media URL for a post and streams it to disk.

use super::{
    http::download_to_file,
    photo::download_photo_set,
    strategy::Fetcher,
    types::{Artifact, FetchError, FetchRequest},
};
use crate::config::FetchConfig;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Anything smaller is an error page, not a video.
const MIN_VIDEO_BYTES: u64 = 1000;

const API_TIMEOUT: Duration = Duration::from_secs(20);

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid regex"));

pub struct TikwmFetcher {
    client: reqwest::Client,
    api_base: String,
    max_images: usize,
}

/// What the API response pointed us at.
#[derive(Debug, PartialEq, Eq)]
enum Resolved {
    Video(String),
    Photos {
        images: Vec<String>,
        audio: Option<String>,
    },
}

impl TikwmFetcher {
    pub fn new(client: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            client,
            api_base: config.tikwm_api.clone(),
            max_images: config.max_images,
        }
    }

    async fn resolve(&self, post_url: &Url) -> Result<Resolved, FetchError> {
        let api = Url::parse_with_params(&self.api_base, &[("url", post_url.as_str())])
            .map_err(|e| FetchError::Http(format!("invalid API base: {e}")))?;
        debug!("Querying secondary API: {}", api);

        let response = self.client.get(api).timeout(API_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Http(format!(
                "API returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        resolve_body(&body).ok_or(FetchError::NoMediaFound)
    }
}

fn resolve_body(body: &str) -> Option<Resolved> {
    let data = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("data").cloned())
        .unwrap_or(Value::Null);

    let images: Vec<String> = data["images"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if !images.is_empty() {
        let audio = data["music"]
            .as_str()
            .or_else(|| data["music_info"]["play"].as_str())
            .map(str::to_string);
        return Some(Resolved::Photos { images, audio });
    }

    let direct = ["play", "hdplay", "download"]
        .iter()
        .find_map(|key| data[*key].as_str().filter(|s| !s.is_empty()))
        .map(str::to_string);
    if let Some(url) = direct {
        return Some(Resolved::Video(url));
    }

    // Unexpected response shape: look for anything that resembles a video link.
    let unescaped = body.replace("\\/", "/");
    URL_RE
        .find_iter(&unescaped)
        .map(|m| m.as_str())
        .find(|u| u.contains(".mp4") || u.contains("v.tiktok") || u.contains("vm.tiktok"))
        .map(|u| Resolved::Video(u.to_string()))
}

#[async_trait]
impl Fetcher for TikwmFetcher {
    fn name(&self) -> &'static str {
        "tikwm"
    }

    async fn fetch(&self, request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError> {
        match self.resolve(&request.url).await? {
            Resolved::Video(video_url) => {
                info!("Streaming video from secondary API");
                let path = workdir.join("video.mp4");
                let size_bytes = download_to_file(&self.client, &video_url, &path).await?;
                if size_bytes <= MIN_VIDEO_BYTES {
                    return Err(FetchError::Http(format!(
                        "downloaded file is too small ({size_bytes} bytes)"
                    )));
                }
                Ok(Artifact::Video { path, size_bytes })
            }
            Resolved::Photos { images, audio } => {
                info!(images = images.len(), "Secondary API returned a photo post");
                download_photo_set(&self.client, &images, audio.as_deref(), workdir, self.max_images)
                    .await
            }
        }
    }
}
