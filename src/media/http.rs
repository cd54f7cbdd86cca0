//! Shared HTTP helpers for the fetchers.

use super::types::FetchError;
use crate::config::FetchConfig;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub fn build_client(config: &FetchConfig) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| FetchError::Http(format!("failed to create HTTP client: {e}")))
}

/// Streams `url` into `dest` chunk by chunk and returns the number of bytes written.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, FetchError> {
    debug!("Downloading {} to {}", url, dest.display());

    let mut response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(FetchError::Http(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(bytes = written, "Download finished: {}", dest.display());
    Ok(written)
}

/// File extension from the URL path, lowercased, or `default`.
pub fn extension_from_url(url: &str, default: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            let path = u.path().to_string();
            let file = path.rsplit('/').next()?.to_string();
            let (_, ext) = file.rsplit_once('.')?;
            let ext = ext.to_lowercase();
            (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then_some(ext)
        })
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_from_url("https://cdn.example/a/b/photo.JPEG?x=1", "jpg"), "jpeg");
        assert_eq!(extension_from_url("https://cdn.example/a/b/track.mp3", "m4a"), "mp3");
        assert_eq!(extension_from_url("https://cdn.example/a/b/noext", "jpg"), "jpg");
        assert_eq!(extension_from_url("not a url", "mp4"), "mp4");
        assert_eq!(extension_from_url("https://cdn.example/a.b/c", "webp"), "webp");
    }

    #[tokio::test]
    async fn test_download_to_file_streams_body() {
        let mock_server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];

        Mock::given(method("GET"))
            .and(path("/media.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("media.mp4");
        let client = build_client(&FetchConfig::default()).unwrap();

        let written = download_to_file(&client, &format!("{}/media.mp4", mock_server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_to_file_rejects_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = build_client(&FetchConfig::default()).unwrap();

        let err = download_to_file(
            &client,
            &format!("{}/gone.jpg", mock_server.uri()),
            &dir.path().join("gone.jpg"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::Http(msg) if msg.contains("404")));
        assert!(!dir.path().join("gone.jpg").exists());
    }
}
