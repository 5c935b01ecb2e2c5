//! Trigger payload handed over by the orchestrator and the outcome document
//! printed back.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("failed to read event {source_name}: {source}")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid event payload at {path}: {message}")]
    Parse { path: String, message: String },
}

/// Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub secret_name: Option<String>,
    /// SQL script run instead of the embedded migrations.
    #[serde(default)]
    pub schema_sql: Option<String>,
    /// Workbook location, possibly percent-encoded.
    #[serde(default)]
    pub input_path: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
}

impl Event {
    /// Read from a file, or from stdin when `path` is `-`.
    pub fn load(path: &Path) -> Result<Self, EventError> {
        let source_name = path.display().to_string();
        let raw = if path == Path::new("-") {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|source| EventError::Io { source_name, source })?;
            buf
        } else {
            std::fs::read_to_string(path).map_err(|source| EventError::Io { source_name, source })?
        };
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, EventError> {
        if raw.trim().is_empty() {
            return Ok(Event::default());
        }
        let de = &mut serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(de).map_err(|e| EventError::Parse {
            path: e.path().to_string(),
            message: e.inner().to_string(),
        })
    }

    pub fn input_path(&self) -> Option<PathBuf> {
        self.input_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(crate::spreadsheet::decode_input_path(p)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    /// Stage-specific report (ingest counts, per-table upsert outcomes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: OutcomeBody,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Outcome {
            status_code: StatusCode::OK.as_u16(),
            body: OutcomeBody {
                message: message.into(),
                ..OutcomeBody::default()
            },
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>, error: impl ToString) -> Self {
        Outcome {
            status_code: status.as_u16(),
            body: OutcomeBody {
                message: message.into(),
                error: Some(error.to_string()),
                ..OutcomeBody::default()
            },
        }
    }

    pub fn in_stage(mut self, stage: &str) -> Self {
        self.body.failed_stage = Some(stage.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        StatusCode::from_u16(self.status_code).is_ok_and(|s| s.is_success())
    }
}
