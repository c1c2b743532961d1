//! Wire types returned by the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::analyzers::AnalyzerPayload;
use crate::error::{AnalyzerError, ErrorDetail};
use crate::model::{SessionKey, SessionSummary};

/// Outcome of a single analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerStatus {
    Ok,
    /// Ran, but only part of the requested scope could be analyzed
    PartialData,
    Failed,
}

/// Overall outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Ok,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    /// Name as requested
    pub analyzer: String,
    pub status: AnalyzerStatus,
    pub payload: Option<Value>,
    pub notes: Vec<String>,
    pub error: Option<ErrorDetail>,
    pub elapsed_ms: u64,
}

impl AnalyzerResult {
    pub fn from_payload(analyzer: impl Into<String>, payload: AnalyzerPayload, elapsed: Duration) -> Self {
        let status = if payload.partial { AnalyzerStatus::PartialData } else { AnalyzerStatus::Ok };
        Self {
            analyzer: analyzer.into(),
            status,
            payload: Some(payload.document),
            notes: payload.notes,
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(analyzer: impl Into<String>, error: &AnalyzerError, elapsed: Duration) -> Self {
        Self {
            analyzer: analyzer.into(),
            status: AnalyzerStatus::Failed,
            payload: None,
            notes: Vec::new(),
            error: Some(ErrorDetail::from(error)),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn from_outcome(
        analyzer: impl Into<String>,
        outcome: Result<AnalyzerPayload, AnalyzerError>,
        elapsed: Duration,
    ) -> Self {
        match outcome {
            Ok(payload) => Self::from_payload(analyzer, payload, elapsed),
            Err(error) => Self::failed(analyzer, &error, elapsed),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AnalyzerStatus::Ok
    }

    pub fn is_failed(&self) -> bool {
        self.status == AnalyzerStatus::Failed
    }
}

/// Response for one pipeline request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEnvelope {
    pub session: SessionKey,
    pub generated_at: DateTime<Utc>,
    pub status: EnvelopeStatus,
    /// Present once the session loaded
    pub summary: Option<SessionSummary>,
    /// One entry per distinct requested analyzer, in request order
    pub results: Vec<AnalyzerResult>,
    /// Why the whole request failed, when it did before any analyzer ran
    pub error: Option<ErrorDetail>,
}

impl PipelineEnvelope {
    /// Result for an analyzer by requested name.
    pub fn result(&self, analyzer: &str) -> Option<&AnalyzerResult> {
        self.results.iter().find(|r| r.analyzer == analyzer)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
