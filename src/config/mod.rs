use crate::quota::QuotaLimits;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub logging: LoggingConfig,
    pub queue: QueueConfig,
    pub fetch: FetchConfig,
    pub quota: QuotaLimits,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: Option<String>,
    /// Users allowed to run `/grant`.
    pub admin_ids: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub warn_threshold: usize,
    pub job_timeout_secs: u64,
    /// Parent directory for per-job workspaces; system temp dir when unset.
    pub temp_root: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval_ms: 500,
            warn_threshold: 100,
            job_timeout_secs: 300,
            temp_root: None,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub tikwm_api: String,
    pub max_images: usize,
    pub http_timeout_secs: u64,
    pub extractor_timeout_secs: u64,
    /// yt-dlp format for Diamond jobs.
    pub priority_format: String,
    /// yt-dlp format for everyone else.
    pub standard_format: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
            tikwm_api: "https://www.tikwm.com/api/".to_string(),
            max_images: 20,
            http_timeout_secs: 60,
            extractor_timeout_secs: 120,
            priority_format: "bestvideo+bestaudio/best".to_string(),
            standard_format: "bestvideo[height<=720]+bestaudio/best[height<=720]/best".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn extractor_timeout(&self) -> Duration {
        Duration::from_secs(self.extractor_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_upload_bytes: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            // Discord's limit for servers without boosts
            max_upload_bytes: 25_000_000,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.workers == 0 {
            return Err(ConfigError::Invalid("queue.workers must be at least 1".into()));
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "queue.poll_interval_ms must be positive".into(),
            ));
        }
        if self.fetch.max_images == 0 {
            return Err(ConfigError::Invalid("fetch.max_images must be at least 1".into()));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    pub fn get_discord_token(&self) -> Option<&str> {
        self.discord.token.as_deref()
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.discord.admin_ids.contains(&user_id)
    }
}
