use serde_json::{json, Value};

use super::Sample;
use crate::error::IngestError;

/// Outcome of a single ingest call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted { id: i64, sample: Sample, alert: bool },
    /// Arrived inside the gate interval and was dropped without side effects.
    Skipped,
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// 回给上报方的确认消息
    pub fn ack(&self) -> Value {
        match self {
            Self::Accepted { alert, .. } => json!({ "status": "ok", "alert": alert }),
            Self::Skipped => json!({ "status": "skipped" }),
        }
    }
}

/// Acknowledgement for any ingest result, failures included.
pub fn ack_for(result: &Result<IngestOutcome, IngestError>) -> Value {
    match result {
        Ok(outcome) => outcome.ack(),
        Err(e) => json!({ "status": "error", "message": e.to_string() }),
    }
}
