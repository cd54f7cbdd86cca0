use super::{
    strategy::Fetcher,
    types::{Artifact, FetchError, FetchRequest},
};
use crate::config::FetchConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// yt-dlp messages that mean the post exists but carries no video (photo slideshows).
const NO_VIDEO_MARKERS: &[&str] = &[
    "No video formats found",
    "There is no video in this post",
    "Unsupported URL",
];

pub struct YtDlpFetcher {
    priority_format: String,
    standard_format: String,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            priority_format: config.priority_format.clone(),
            standard_format: config.standard_format.clone(),
            timeout: config.extractor_timeout(),
        }
    }

    fn format_for(&self, request: &FetchRequest) -> &str {
        if request.tier.is_priority() {
            &self.priority_format
        } else {
            &self.standard_format
        }
    }

    pub async fn test_availability() -> bool {
        let yt_dlp_available = match Command::new("yt-dlp").arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp is available, version: {}", version.trim());
                true
            }
            Ok(_) => {
                warn!("❌ yt-dlp command failed");
                false
            }
            Err(e) => {
                warn!("❌ yt-dlp not found: {}", e);
                false
            }
        };

        // ffmpeg is needed to merge separate video and audio streams
        match Command::new("ffmpeg").arg("-version").output().await {
            Ok(output) if output.status.success() => {
                let version_line = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("unknown")
                    .to_string();
                info!("✅ ffmpeg is available: {}", version_line);
            }
            _ => {
                if yt_dlp_available {
                    warn!("⚠️  ffmpeg not found, yt-dlp cannot merge video and audio streams");
                }
            }
        }

        yt_dlp_available
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError> {
        let format = self.format_for(request);
        info!("Downloading media with yt-dlp: {}", request.url);
        debug!(format, "yt-dlp format selected");

        let template = workdir.join("%(id)s.%(ext)s");
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("yt-dlp")
                .arg("--no-playlist")
                .arg("--no-warnings")
                .arg("--format")
                .arg(format)
                .arg("--merge-output-format")
                .arg("mp4")
                .arg("--output")
                .arg(&template)
                .arg("--print")
                .arg("after_move:filepath")
                .arg(request.url.as_str())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| FetchError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = match printed_path(&stdout) {
            Some(path) => path,
            None => largest_file(workdir).await?.ok_or_else(|| {
                FetchError::Extractor("yt-dlp reported success but wrote no file".into())
            })?,
        };

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        Ok(Artifact::Video { path, size_bytes })
    }
}

fn classify_failure(stderr: &str) -> FetchError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();

    if NO_VIDEO_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        FetchError::NoVideoStream(message)
    } else {
        FetchError::Extractor(message)
    }
}

fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
        .filter(|path| path.is_file())
}

async fn largest_file(dir: &Path) -> Result<Option<PathBuf>, FetchError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<(u64, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        if best.as_ref().is_none_or(|(size, _)| metadata.len() > *size) {
            best = Some((metadata.len(), entry.path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}
