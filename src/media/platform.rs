use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    YouTube,
    TikTok,
    Instagram,
    Other,
}

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];
const TIKTOK_HOSTS: &[&str] = &["tiktok.com"];
const INSTAGRAM_HOSTS: &[&str] = &["instagram.com", "instagr.am"];

impl Platform {
    pub fn classify(url: &Url) -> Platform {
        let Some(host) = url.host_str() else {
            return Platform::Other;
        };
        let host = host.to_lowercase();

        if matches_host(&host, YOUTUBE_HOSTS) {
            Platform::YouTube
        } else if matches_host(&host, TIKTOK_HOSTS) {
            Platform::TikTok
        } else if matches_host(&host, INSTAGRAM_HOSTS) {
            Platform::Instagram
        } else {
            Platform::Other
        }
    }

    /// Platforms we refuse to download from at all.
    pub fn is_disallowed(self) -> bool {
        self == Platform::YouTube
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::YouTube => "YouTube",
            Platform::TikTok => "TikTok",
            Platform::Instagram => "Instagram",
            Platform::Other => "other",
        };
        f.write_str(name)
    }
}

fn matches_host(host: &str, domains: &[&str]) -> bool {
    domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// First http(s) link in a chat message.
pub fn extract_url(content: &str) -> Option<Url> {
    content
        .split_whitespace()
        .filter(|word| word.starts_with("http://") || word.starts_with("https://"))
        .find_map(|word| Url::parse(word).ok())
}
