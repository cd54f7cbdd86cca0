//! Photo-post fetcher for slideshow posts that have no video stream.
//!
//! The post page embeds its state as JSON inside `<script>` tags. We look there first for
//! the ordered image list and the background track; if the page layout changed and nothing
//! parses, a plain scan of the markup for image and audio links is the last resort.

use super::{
    http::{download_to_file, extension_from_url},
    strategy::Fetcher,
    types::{Artifact, FetchError, FetchRequest},
};
use crate::config::FetchConfig;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

const STATE_SCRIPT_IDS: &[&str] = &[
    "__UNIVERSAL_DATA_FOR_REHYDRATION__",
    "SIGI_STATE",
    "__NEXT_DATA__",
];

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>\\]+?\.(?:jpe?g|png|webp|heic)\b(?:\?[^\s"'<>\\]*)?"#)
        .expect("valid regex")
});

static AUDIO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>\\]+?\.(?:mp3|m4a|aac)\b(?:\?[^\s"'<>\\]*)?"#)
        .expect("valid regex")
});

pub struct PhotoPostFetcher {
    client: reqwest::Client,
    max_images: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PostMedia {
    pub images: Vec<String>,
    pub audio: Option<String>,
}

impl PostMedia {
    fn is_empty(&self) -> bool {
        self.images.is_empty() && self.audio.is_none()
    }
}

impl PhotoPostFetcher {
    pub fn new(client: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            client,
            max_images: config.max_images,
        }
    }
}

#[async_trait]
impl Fetcher for PhotoPostFetcher {
    fn name(&self) -> &'static str {
        "photo-post"
    }

    async fn fetch(&self, request: &FetchRequest, workdir: &Path) -> Result<Artifact, FetchError> {
        let response = self.client.get(request.url.as_str()).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Http(format!(
                "post page returned {}",
                response.status()
            )));
        }
        let html = response.text().await?;

        let media = extract_media(&html);
        if media.is_empty() {
            return Err(FetchError::NoMediaFound);
        }

        info!(
            images = media.images.len(),
            has_audio = media.audio.is_some(),
            "Located photo post media"
        );
        download_photo_set(
            &self.client,
            &media.images,
            media.audio.as_deref(),
            workdir,
            self.max_images,
        )
        .await
    }
}

/// Structured data first, then a raw markup scan for whatever it lacked.
pub(crate) fn extract_media(html: &str) -> PostMedia {
    let mut media = extract_from_scripts(html);
    if !media.images.is_empty() {
        debug!("Photo post media found in embedded JSON");
        return media;
    }

    debug!("Embedded JSON had no images, scanning markup");
    let scanned = scan_markup(html);
    media.images = scanned.images;
    if media.audio.is_none() {
        media.audio = scanned.audio;
    }
    media
}

fn extract_from_scripts(html: &str) -> PostMedia {
    let document = Html::parse_document(html);
    let script_sel = Selector::parse("script").expect("valid selector");

    let mut media = PostMedia::default();
    for script in document.select(&script_sel) {
        let element = script.value();
        let is_state = element
            .id()
            .is_some_and(|id| STATE_SCRIPT_IDS.contains(&id));
        let is_json = element
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("application/json"));
        if !is_state && !is_json {
            continue;
        }

        let text: String = script.text().collect();
        let Ok(json) = serde_json::from_str::<Value>(text.trim()) else {
            continue;
        };

        collect_from_json(&json, &mut media);
        if !media.images.is_empty() {
            break;
        }
    }

    dedupe(&mut media.images);
    media
}

/// Walks the page state looking for the image list and the background track.
fn collect_from_json(value: &Value, media: &mut PostMedia) {
    match value {
        Value::Object(map) => {
            // TikTok: imagePost.images[*].imageURL.urlList[0]
            if let Some(images) = map
                .get("imagePost")
                .and_then(|post| post.get("images"))
                .and_then(Value::as_array)
            {
                media.images.extend(images.iter().filter_map(|image| {
                    image
                        .pointer("/imageURL/urlList/0")
                        .or_else(|| image.pointer("/displayImage/urlList/0"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }));
            }

            // Instagram carousel items
            if let Some(url) = map
                .get("display_url")
                .or_else(|| map.get("image_versions2").and_then(|v| v.pointer("/candidates/0/url")))
                .and_then(Value::as_str)
            {
                media.images.push(url.to_string());
            }

            if media.audio.is_none() {
                media.audio = map
                    .get("music")
                    .and_then(|music| music.get("playUrl"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }

            for (key, child) in map {
                // Already handled above, and descending would add thumbnails twice.
                if key == "imagePost" || key == "image_versions2" {
                    continue;
                }
                collect_from_json(child, media);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_from_json(item, media);
            }
        }
        _ => {}
    }
}

fn scan_markup(html: &str) -> PostMedia {
    let unescaped = html.replace("\\u002F", "/").replace("\\/", "/").replace("&amp;", "&");

    let mut images: Vec<String> = IMAGE_RE
        .find_iter(&unescaped)
        .map(|m| m.as_str().to_string())
        .collect();
    dedupe(&mut images);

    let audio = AUDIO_RE
        .find(&unescaped)
        .map(|m| m.as_str().to_string());

    PostMedia { images, audio }
}

fn dedupe(urls: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    urls.retain(|url| seen.insert(url.clone()));
}

/// Downloads up to `max_images` images and at most one audio track into `workdir`.
///
/// Individual failures are tolerated: a missing image is counted, a missing track leaves
/// `audio` empty. Only a post with nothing downloadable is an error.
pub(crate) async fn download_photo_set(
    client: &reqwest::Client,
    images: &[String],
    audio: Option<&str>,
    workdir: &Path,
    max_images: usize,
) -> Result<Artifact, FetchError> {
    if images.len() > max_images {
        info!(
            found = images.len(),
            max_images, "Photo post exceeds image cap, truncating"
        );
    }

    let mut paths = Vec::new();
    let mut missing = 0;
    for (index, image_url) in images.iter().take(max_images).enumerate() {
        let ext = extension_from_url(image_url, "jpg");
        let dest = workdir.join(format!("img_{:02}.{}", index + 1, ext));
        match download_to_file(client, image_url, &dest).await {
            Ok(_) => paths.push(dest),
            Err(e) => {
                warn!("Failed to download image {}: {}", image_url, e);
                missing += 1;
            }
        }
    }

    let audio_path = match audio {
        Some(audio_url) => {
            let ext = extension_from_url(audio_url, "mp3");
            let dest = workdir.join(format!("audio.{ext}"));
            match download_to_file(client, audio_url, &dest).await {
                Ok(_) => Some(dest),
                Err(e) => {
                    warn!("Failed to download audio {}: {}", audio_url, e);
                    None
                }
            }
        }
        None => None,
    };

    if paths.is_empty() && audio_path.is_none() {
        return Err(FetchError::NoMediaFound);
    }

    Ok(Artifact::PhotoSet {
        images: paths,
        audio: audio_path,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::http::build_client;
    use crate::queue::Tier;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIKTOK_PAGE: &str = r#"<html><head>
<script id="__UNIVERSAL_DATA_FOR_REHYDRATION__" type="application/json">
{"__DEFAULT_SCOPE__":{"webapp.video-detail":{"itemInfo":{"itemStruct":{
  "imagePost":{"images":[
    {"imageURL":{"urlList":["https://p16.cdn/a.jpeg","https://p16.cdn/a-alt.jpeg"]}},
    {"imageURL":{"urlList":["https://p16.cdn/b.jpeg"]}}
  ]},
  "music":{"playUrl":"https://sf16.cdn/track.mp3"}
}}}}}
</script></head><body></body></html>"#;

    #[test]
    fn test_extract_structured_tiktok() {
        let media = extract_media(TIKTOK_PAGE);
        assert_eq!(
            media.images,
            vec!["https://p16.cdn/a.jpeg".to_string(), "https://p16.cdn/b.jpeg".to_string()]
        );
        assert_eq!(media.audio.as_deref(), Some("https://sf16.cdn/track.mp3"));
    }

    #[test]
    fn test_extract_structured_instagram() {
        let page = r#"<script type="application/json">
{"items":[{"carousel_media":[
  {"image_versions2":{"candidates":[{"url":"https://ig.cdn/1.jpg"},{"url":"https://ig.cdn/1s.jpg"}]}},
  {"display_url":"https://ig.cdn/2.jpg"}
]}]}
</script>"#;
        let media = extract_media(page);
        assert_eq!(
            media.images,
            vec!["https://ig.cdn/1.jpg".to_string(), "https://ig.cdn/2.jpg".to_string()]
        );
        assert_eq!(media.audio, None);
    }

    #[test]
    fn test_markup_scan_when_json_missing() {
        let page = r#"<div data-src="https:\/\/cdn.example\/x\/one.webp?sig=1"></div>
<img src="https://cdn.example/x/two.jpg">
<img src="https://cdn.example/x/two.jpg">
<audio src="https://cdn.example/x/song.m4a"></audio>"#;
        let media = extract_media(page);
        assert_eq!(
            media.images,
            vec![
                "https://cdn.example/x/one.webp?sig=1".to_string(),
                "https://cdn.example/x/two.jpg".to_string()
            ]
        );
        assert_eq!(media.audio.as_deref(), Some("https://cdn.example/x/song.m4a"));
    }

    #[test]
    fn test_markup_images_used_when_json_only_has_audio() {
        let page = r#"<script id="SIGI_STATE" type="application/json">
{"ItemModule":{"1":{"music":{"playUrl":"https://sf16.cdn/track.mp3"}}}}
</script>
<img src="https://p16.cdn/c.jpeg">
<img src="https://p16.cdn/d.png">
<audio src="https://other.cdn/fallback.m4a"></audio>"#;
        let media = extract_media(page);
        assert_eq!(
            media.images,
            vec!["https://p16.cdn/c.jpeg".to_string(), "https://p16.cdn/d.png".to_string()]
        );
        assert_eq!(media.audio.as_deref(), Some("https://sf16.cdn/track.mp3"));
    }

    #[test]
    fn test_nothing_found() {
        let media = extract_media("<html><body>This post is private</body></html>");
        assert!(media.is_empty());
    }

    async fn mount_file(server: &MockServer, route: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(route.to_string()))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(vec![0u8; 256]))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_download_photo_set_partial_images_and_missing_audio() {
        let server = MockServer::start().await;
        mount_file(&server, "/a.jpg", 200).await;
        mount_file(&server, "/b.jpg", 404).await;
        mount_file(&server, "/c.png", 200).await;
        mount_file(&server, "/track.mp3", 500).await;

        let images: Vec<String> = ["/a.jpg", "/b.jpg", "/c.png"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();
        let audio = format!("{}/track.mp3", server.uri());

        let dir = tempfile::tempdir().unwrap();
        let client = build_client(&FetchConfig::default()).unwrap();
        let artifact = download_photo_set(&client, &images, Some(&audio), dir.path(), 20)
            .await
            .unwrap();

        assert_eq!(
            artifact,
            Artifact::PhotoSet {
                images: vec![dir.path().join("img_01.jpg"), dir.path().join("img_03.png")],
                audio: None,
                missing: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_download_photo_set_caps_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
            .mount(&server)
            .await;

        let images: Vec<String> = (0..25)
            .map(|i| format!("{}/img{}.jpg", server.uri(), i))
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let client = build_client(&FetchConfig::default()).unwrap();
        let artifact = download_photo_set(&client, &images, None, dir.path(), 20)
            .await
            .unwrap();

        match artifact {
            Artifact::PhotoSet { images, audio, missing } => {
                assert_eq!(images.len(), 20);
                assert!(audio.is_none());
                assert_eq!(missing, 0);
            }
            other => panic!("unexpected artifact: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_download_photo_set_all_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = build_client(&FetchConfig::default()).unwrap();
        let err = download_photo_set(
            &client,
            &[format!("{}/a.jpg", server.uri())],
            None,
            dir.path(),
            20,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::NoMediaFound));
    }

    #[tokio::test]
    async fn test_fetch_page_end_to_end() {
        let server = MockServer::start().await;
        let page = format!(
            r#"<script id="SIGI_STATE" type="application/json">{{"ItemModule":{{"1":{{
                "imagePost":{{"images":[{{"imageURL":{{"urlList":["{0}/1.jpeg"]}}}}]}},
                "music":{{"playUrl":"{0}/m.mp3"}}}}}}}}</script>"#,
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/@user/photo/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;
        mount_file(&server, "/1.jpeg", 200).await;
        mount_file(&server, "/m.mp3", 200).await;

        let config = FetchConfig::default();
        let fetcher = PhotoPostFetcher::new(build_client(&config).unwrap(), &config);
        let request = FetchRequest::new(
            Url::parse(&format!("{}/@user/photo/1", server.uri())).unwrap(),
            Tier::Standard,
        );

        let dir = tempfile::tempdir().unwrap();
        let artifact = fetcher.fetch(&request, dir.path()).await.unwrap();
        assert_eq!(
            artifact,
            Artifact::PhotoSet {
                images: vec![dir.path().join("img_01.jpeg")],
                audio: Some(dir.path().join("audio.mp3")),
                missing: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_private_post_reports_no_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>private</html>"))
            .mount(&server)
            .await;

        let config = FetchConfig::default();
        let fetcher = PhotoPostFetcher::new(build_client(&config).unwrap(), &config);
        let request = FetchRequest::new(
            Url::parse(&format!("{}/p/abc/", server.uri())).unwrap(),
            Tier::Standard,
        );

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher.fetch(&request, dir.path()).await.unwrap_err();
        assert!(matches!(err, FetchError::NoMediaFound));
    }
}
