//! Dataset refresh ("ingestion") request against the reporting service.

use crate::config::ConfigError;
use http::StatusCode;
use log::{error, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_INGESTION_STATUS: &str = "INITIATED";

#[derive(Clone, Default)]
pub struct RefreshConfig {
    pub endpoint: Option<String>,
    pub account_id: Option<String>,
    pub dataset_id: Option<String>,
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for RefreshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshConfig")
            .field("endpoint", &self.endpoint)
            .field("account_id", &self.account_id)
            .field("dataset_id", &self.dataset_id)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RefreshConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let timeout = match lookup("REFRESH_TIMEOUT_SECS") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "REFRESH_TIMEOUT_SECS",
                value: v.clone(),
            })?,
            None => DEFAULT_REFRESH_TIMEOUT_SECS,
        };
        Ok(RefreshConfig {
            endpoint: lookup("REFRESH_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
            account_id: lookup("REFRESH_ACCOUNT_ID"),
            dataset_id: lookup("REFRESH_DATASET_ID"),
            bearer_token: lookup("REFRESH_BEARER_TOKEN"),
            timeout: Duration::from_secs(timeout),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("missing required refresh configuration: {}", .0.join(", "))]
    MissingSetting(Vec<&'static str>),
    #[error("refresh request failed: {0}")]
    Transport(#[from] ureq::Error),
    #[error("refresh request returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected refresh response at {path}: {message}")]
    Response { path: String, message: String },
}

impl RefreshError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RefreshError::MissingSetting(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReceipt {
    pub ingestion_id: String,
    pub ingestion_status: String,
}

#[derive(Serialize)]
struct IngestionRequest {
    #[serde(rename = "IngestionType")]
    ingestion_type: &'static str,
}

#[derive(Deserialize)]
struct IngestionResponse {
    #[serde(rename = "IngestionStatus")]
    ingestion_status: Option<String>,
}

/// `ingestion-` followed by a random version-4 style identifier.
pub fn new_ingestion_id() -> String {
    let mut bytes: [u8; 16] = rand::rng().random();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "ingestion-{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn ingestion_url(endpoint: &str, account_id: &str, dataset_id: &str, ingestion_id: &str) -> String {
    format!(
        "{}/accounts/{}/data-sets/{}/ingestions/{}",
        endpoint,
        urlencoding::encode(account_id),
        urlencoding::encode(dataset_id),
        urlencoding::encode(ingestion_id)
    )
}

/// Ask the reporting service for a full refresh of the dataset.
pub fn trigger_refresh(cfg: &RefreshConfig) -> Result<RefreshReceipt, RefreshError> {
    let (endpoint, account_id, dataset_id) = match (&cfg.endpoint, &cfg.account_id, &cfg.dataset_id) {
        (Some(e), Some(a), Some(d)) => (e, a, d),
        _ => {
            let mut missing = Vec::new();
            if cfg.endpoint.is_none() {
                missing.push("REFRESH_ENDPOINT");
            }
            if cfg.account_id.is_none() {
                missing.push("REFRESH_ACCOUNT_ID");
            }
            if cfg.dataset_id.is_none() {
                missing.push("REFRESH_DATASET_ID");
            }
            error!("Refresh not attempted: missing {}", missing.join(", "));
            return Err(RefreshError::MissingSetting(missing));
        }
    };

    let ingestion_id = new_ingestion_id();
    let url = ingestion_url(endpoint, account_id, dataset_id, &ingestion_id);
    info!("Requesting refresh of dataset {} ({})", dataset_id, ingestion_id);

    let config = ureq::Agent::config_builder()
        .timeout_global(Some(cfg.timeout))
        .http_status_as_error(false)
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let mut request = agent.put(&url).header("Accept", "application/json");
    if let Some(token) = &cfg.bearer_token {
        request = request.header("Authorization", &format!("Bearer {}", token));
    }
    let mut resp = request.send_json(&IngestionRequest {
        ingestion_type: "FULL_REFRESH",
    })?;

    let status = resp.status();
    let body = resp.body_mut().read_to_string()?;
    if !status.is_success() {
        error!("Refresh request for {} returned HTTP {}", ingestion_id, status.as_u16());
        return Err(RefreshError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let ingestion_status = parse_status(&body)?;
    info!("Refresh {} accepted with status {}", ingestion_id, ingestion_status);
    Ok(RefreshReceipt {
        ingestion_id,
        ingestion_status,
    })
}

fn parse_status(body: &str) -> Result<String, RefreshError> {
    if body.trim().is_empty() {
        return Ok(DEFAULT_INGESTION_STATUS.to_string());
    }
    let de = &mut serde_json::Deserializer::from_str(body);
    let parsed: IngestionResponse = serde_path_to_error::deserialize(de).map_err(|e| RefreshError::Response {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })?;
    Ok(parsed
        .ingestion_status
        .unwrap_or_else(|| DEFAULT_INGESTION_STATUS.to_string()))
}
