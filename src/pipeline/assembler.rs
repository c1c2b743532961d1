//! Builds response envelopes from analyzer outcomes

use chrono::Utc;

use super::envelope::{AnalyzerResult, EnvelopeStatus, PipelineEnvelope};
use crate::error::{ErrorDetail, SessionError};
use crate::model::{SessionKey, SessionSummary};

/// Stateless envelope builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseAssembler;

impl ResponseAssembler {
    /// Envelope for a loaded session; `results` must already be in request order.
    pub fn assemble(key: &SessionKey, summary: SessionSummary, results: Vec<AnalyzerResult>) -> PipelineEnvelope {
        PipelineEnvelope {
            session: key.clone(),
            generated_at: Utc::now(),
            status: Self::status(&results),
            summary: Some(summary),
            results,
            error: None,
        }
    }

    /// Envelope for a request whose session could not be loaded.
    pub fn assemble_failure(key: &SessionKey, error: &SessionError) -> PipelineEnvelope {
        PipelineEnvelope {
            session: key.clone(),
            generated_at: Utc::now(),
            status: EnvelopeStatus::Failed,
            summary: None,
            results: Vec::new(),
            error: Some(ErrorDetail::from(error)),
        }
    }

    /// `Ok` when nothing was requested or everything succeeded fully,
    /// `Failed` when every analyzer failed, `PartialSuccess` otherwise.
    pub fn status(results: &[AnalyzerResult]) -> EnvelopeStatus {
        if results.iter().all(AnalyzerResult::is_ok) {
            EnvelopeStatus::Ok
        } else if results.iter().all(AnalyzerResult::is_failed) {
            EnvelopeStatus::Failed
        } else {
            EnvelopeStatus::PartialSuccess
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerPayload;
    use crate::error::{AnalyzerError, ErrorKind};
    use crate::model::SessionType;
    use std::time::Duration;

    fn ok(name: &str) -> AnalyzerResult {
        AnalyzerResult::from_payload(name, AnalyzerPayload::complete(serde_json::json!({})), Duration::ZERO)
    }

    fn failed(name: &str) -> AnalyzerResult {
        AnalyzerResult::failed(name, &AnalyzerError::unknown(name), Duration::ZERO)
    }

    fn partial(name: &str) -> AnalyzerResult {
        let payload = AnalyzerPayload::from_document(&serde_json::json!({}), vec!["skipped".into()]).unwrap();
        AnalyzerResult::from_payload(name, payload, Duration::ZERO)
    }

    #[test]
    fn overall_status() {
        assert_eq!(ResponseAssembler::status(&[]), EnvelopeStatus::Ok);
        assert_eq!(ResponseAssembler::status(&[ok("a"), ok("b")]), EnvelopeStatus::Ok);
        assert_eq!(ResponseAssembler::status(&[ok("a"), failed("b")]), EnvelopeStatus::PartialSuccess);
        assert_eq!(ResponseAssembler::status(&[partial("a")]), EnvelopeStatus::PartialSuccess);
        assert_eq!(ResponseAssembler::status(&[failed("a"), failed("b")]), EnvelopeStatus::Failed);
    }

    #[test]
    fn failure_envelope_carries_the_session_error() {
        let key = SessionKey::new(2024, "bahrain", SessionType::Race);
        let envelope = ResponseAssembler::assemble_failure(&key, &SessionError::not_found(&key));
        assert_eq!(envelope.status, EnvelopeStatus::Failed);
        assert!(envelope.results.is_empty());
        assert!(envelope.summary.is_none());
        assert_eq!(envelope.error.as_ref().map(|e| e.kind), Some(ErrorKind::NotFound));
    }

    #[test]
    fn envelope_serializes_snake_case() {
        let key = SessionKey::new(2024, "bahrain", SessionType::Race);
        let summary = SessionSummary { drivers: 1, laps: 3, laps_with_telemetry: 2, weather_samples: 0, stints: 2 };
        let envelope = ResponseAssembler::assemble(&key, summary, vec![ok("StressIndex"), partial("TirePerformance")]);
        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "partial_success");
        assert_eq!(json["results"][1]["status"], "partial_data");
        assert_eq!(json["results"][0]["analyzer"], "StressIndex");
        assert!(json["generated_at"].is_string());
        assert!(json["error"].is_null());
    }
}
