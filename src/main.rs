use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod bot;
mod config;
mod delivery;
mod media;
mod queue;
mod quota;
#[cfg(test)]
mod test_helpers;
mod worker;

use crate::bot::{DiscordBot, DiscordSink};
use crate::config::Config;
use crate::media::StrategySet;
use crate::queue::JobQueue;
use crate::quota::MemoryQuota;
use crate::worker::{spawn_workers, Metrics, WorkerContext, WorkerSettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn get_config_path(args: &Args) -> Option<PathBuf> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }

    if let Ok(path) = std::env::var("CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        let config_path = PathBuf::from(xdg_config_home).join("snapgrab/config.toml");
        if config_path.exists() {
            return Some(config_path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let config_path = home.join(".config/snapgrab/config.toml");
        if config_path.exists() {
            return Some(config_path);
        }
    }

    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = get_config_path(&args);
    let config = match &config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if config.get_logging_format() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("Starting snapgrab...");
    match &config_path {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    let token = config
        .get_discord_token()
        .map(str::to_string)
        .or_else(|| std::env::var("DISCORD_TOKEN").ok())
        .context("Discord token missing: set discord.token or DISCORD_TOKEN")?;

    let queue = Arc::new(JobQueue::new(config.queue.warn_threshold));
    let quota = Arc::new(MemoryQuota::new(config.quota));

    let strategies =
        StrategySet::from_config(&config.fetch).context("Failed to initialize media strategies")?;
    strategies.test_setup().await;

    let bot = DiscordBot::new(token, config.clone(), queue.clone(), quota.clone()).await?;
    let sink = DiscordSink::new(bot.http(), config.delivery.max_upload_bytes);

    let ctx = Arc::new(WorkerContext {
        queue,
        quota,
        strategies: Arc::new(strategies),
        sink: Arc::new(sink),
        settings: WorkerSettings::from(&config.queue),
        metrics: Metrics::new(),
    });

    let cancel = CancellationToken::new();
    let workers = spawn_workers(ctx.clone(), cancel.clone());

    tokio::select! {
        result = bot.run() => {
            if let Err(e) = result {
                error!("Discord bot stopped with error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    cancel.cancel();
    for handle in workers {
        if let Err(e) = handle.await {
            warn!("Worker task failed: {}", e);
        }
    }

    if !ctx.queue.is_empty() {
        warn!(pending = ctx.queue.len(), "Shutting down with jobs still queued");
    }

    let snapshot = ctx.metrics.snapshot();
    info!(
        total = snapshot.total(),
        delivered = snapshot.delivered,
        quota_exceeded = snapshot.quota_exceeded,
        unsupported = snapshot.unsupported,
        fetch_failed = snapshot.fetch_failed,
        no_media = snapshot.no_media,
        delivery_failed = snapshot.delivery_failed,
        "Shutdown complete"
    );

    Ok(())
}
