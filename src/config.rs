use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::detection::ParseStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub detection: DetectionConfig,
    #[serde(default = "default_staging_config")]
    pub staging: StagingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Public base URL for webhook delivery. Long polling is used when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Self-signed certificate uploaded alongside the webhook registration
    #[serde(default)]
    pub certificate: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Override for S3-compatible services (MinIO, localstack, ...)
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_parsers")]
    pub parsers: Vec<ParseStrategy>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    #[serde(default = "default_staging_dir")]
    pub directory: PathBuf,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_parsers() -> Vec<ParseStrategy> {
    vec![ParseStrategy::PseudoJson, ParseStrategy::KeyValue]
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("photos")
}

fn default_staging_config() -> StagingConfig {
    StagingConfig {
        directory: default_staging_dir(),
    }
}

impl TelegramConfig {
    /// Full webhook URL Telegram should deliver to: `{webhook_url}/{bot_token}/`
    pub fn webhook_endpoint(&self) -> Result<Option<url::Url>> {
        let Some(base) = self.webhook_url.as_deref() else {
            return Ok(None);
        };
        let full = format!("{}/{}/", base.trim_end_matches('/'), self.bot_token);
        let url = url::Url::parse(&full)
            .with_context(|| format!("Invalid webhook_url: {}", base))?;
        Ok(Some(url))
    }
}

impl Config {
    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;

        if config.detection.parsers.is_empty() {
            anyhow::bail!("detection.parsers must list at least one parse strategy");
        }
        config.telegram.webhook_endpoint()?;

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        if !config.staging.directory.exists() {
            std::fs::create_dir_all(&config.staging.directory).with_context(|| {
                format!(
                    "Failed to create staging directory: {}",
                    config.staging.directory.display()
                )
            })?;
        }

        Ok(config)
    }
}
