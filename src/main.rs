mod config;
mod detection;
mod error;
mod formatter;
mod pipeline;
mod platform;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::detection::DetectionClient;
use crate::pipeline::MessagePipeline;
use crate::platform::telegram::{self, TelegramChannel};
use crate::storage::S3Uploader;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,polybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bucket: {}", config.storage.bucket);
    info!("  Detection service: {}", config.detection.base_url);
    info!("  Staging: {}", config.staging.directory.display());

    let bot = teloxide::Bot::new(&config.telegram.bot_token);
    telegram::prepare(&bot).await?;

    let channel = Arc::new(TelegramChannel::new(bot.clone()));
    let uploader = Arc::new(S3Uploader::from_config(&config.storage).await);
    let predictor = Arc::new(DetectionClient::new(&config.detection)?);

    let pipeline = Arc::new(MessagePipeline::new(
        channel.clone(),
        channel,
        uploader,
        predictor,
        config.staging.directory.clone(),
    ));

    info!("Bot is starting...");
    match config.telegram.webhook_endpoint()? {
        Some(url) => telegram::run_webhook(bot, pipeline, &config.telegram, url).await?,
        None => telegram::run_polling(bot, pipeline).await?,
    }

    Ok(())
}
