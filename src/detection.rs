use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::error::PipelineError;
use crate::storage::StorageReference;

/// Mongo-style `ObjectId("...")` wrappers the detection service leaks into
/// its responses.
static OBJECT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ObjectId\("([0-9a-fA-F]+)"\)"#).expect("ObjectId pattern is valid")
});

/// One detected object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[allow(dead_code)]
pub struct DetectionLabel {
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default, rename = "cx")]
    pub center_x: f64,
    #[serde(default, rename = "cy")]
    pub center_y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    StructuredLabels(Vec<DetectionLabel>),
    /// `key: value` entries in the order the service sent them
    RawKeyValue(Vec<(String, String)>),
    Malformed,
}

/// Ways of reading a detection response body, tried in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// JSON with single quotes and `ObjectId("..")` values tolerated
    PseudoJson,
    /// Newline-delimited `key: value` lines, split on the first colon
    KeyValue,
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseStrategy::PseudoJson => write!(f, "pseudo_json"),
            ParseStrategy::KeyValue => write!(f, "key_value"),
        }
    }
}

impl ParseStrategy {
    fn parse(&self, body: &str) -> Result<DetectionResult, String> {
        match self {
            ParseStrategy::PseudoJson => parse_pseudo_json(body),
            ParseStrategy::KeyValue => parse_key_value(body),
        }
    }
}

/// Result of running the strategy list over one response body.
#[derive(Debug)]
pub struct ParsedResponse {
    pub result: DetectionResult,
    /// Strategy that produced `result`; `None` when the body is malformed.
    /// Also what the "parsed with ... strategy" log line names.
    pub matched: Option<ParseStrategy>,
    /// Strategies that were tried before `matched`, with the reason each failed
    pub failures: Vec<(ParseStrategy, String)>,
}

#[derive(Deserialize)]
struct LabelsPayload {
    #[serde(default)]
    labels: Vec<DetectionLabel>,
}

fn parse_pseudo_json(body: &str) -> Result<DetectionResult, String> {
    let normalized = body.replace('\'', "\"");
    let normalized = OBJECT_ID.replace_all(&normalized, "\"${1}\"");

    let value: serde_json::Value =
        serde_json::from_str(&normalized).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("top-level value is not an object".to_string());
    }

    let payload: LabelsPayload = serde_json::from_value(value).map_err(|e| e.to_string())?;
    Ok(DetectionResult::StructuredLabels(payload.labels))
}

fn parse_key_value(body: &str) -> Result<DetectionResult, String> {
    let mut entries = Vec::new();

    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| format!("line {} has no ':' separator", index + 1))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("line {} has an empty key", index + 1));
        }
        if key.contains(['{', '}', '[', ']', '"', '\'']) {
            return Err(format!("line {} has a structured key: {}", index + 1, key));
        }

        entries.push((key.to_string(), value.trim().to_string()));
    }

    if entries.is_empty() {
        return Err("no key: value lines".to_string());
    }
    Ok(DetectionResult::RawKeyValue(entries))
}

/// Try each strategy in order; the first success wins. Never fails: a body
/// no strategy accepts becomes `DetectionResult::Malformed`.
pub fn parse_response(body: &str, strategies: &[ParseStrategy]) -> ParsedResponse {
    let mut failures = Vec::new();

    for strategy in strategies {
        match strategy.parse(body) {
            Ok(result) => {
                info!("Detection response parsed with {} strategy", strategy);
                return ParsedResponse {
                    result,
                    matched: Some(*strategy),
                    failures,
                };
            }
            Err(reason) => {
                debug!("{} strategy rejected detection response: {}", strategy, reason);
                failures.push((*strategy, reason));
            }
        }
    }

    ParsedResponse {
        result: DetectionResult::Malformed,
        matched: None,
        failures,
    }
}

/// Anything that can turn an uploaded image reference into detections.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, image: &StorageReference) -> Result<DetectionResult, PipelineError>;
}

/// HTTP client for the object-detection service.
pub struct DetectionClient {
    client: reqwest::Client,
    base_url: String,
    strategies: Vec<ParseStrategy>,
}

impl DetectionClient {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build detection HTTP client")?;

        info!(
            "Detection client configured: url={}, parsers={:?}",
            config.base_url, config.parsers
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            strategies: config.parsers.clone(),
        })
    }
}

#[async_trait]
impl Predictor for DetectionClient {
    async fn predict(&self, image: &StorageReference) -> Result<DetectionResult, PipelineError> {
        let url = format!("{}/predict", self.base_url);

        debug!("Requesting prediction for {} from {}", image, url);

        let response = self
            .client
            .post(&url)
            .query(&[("imgName", image.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::Service(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Service(e.to_string()))?;

        info!("Detection service response status: {}", status);
        info!("Detection service response text: {}", body);

        if status != reqwest::StatusCode::OK {
            return Err(PipelineError::Service(format!("{} ({})", body, status)));
        }

        let parsed = parse_response(&body, &self.strategies);
        if parsed.matched.is_none() {
            for (strategy, reason) in &parsed.failures {
                warn!("Detection response rejected by {}: {}", strategy, reason);
            }
        }
        Ok(parsed.result)
    }
}
