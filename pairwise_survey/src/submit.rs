//! Delivery of submissions to the ingestion sink.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::payload::SubmissionPayload;
use crate::validate::ValidationError;

/// The answer of the sink.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SinkResponse {
    Success {
        /// `v2` or `legacy`
        mode: String,
        #[serde(default)]
        message: String,
        #[serde(rename = "responseId", default)]
        response_id: String,
    },
    Error {
        message: String,
    },
}

/// The submission did not reach the sink, or its answer was unreadable.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportFailure {
    #[snafu(display("the sink cannot be reached: {message}"))]
    Unreachable { message: String },
    #[snafu(display("the sink answered something unreadable"))]
    UnreadableResponse { source: serde_json::Error },
}

/// Sends one submission to the sink. No retry happens behind this seam.
pub trait Transport {
    fn send(&mut self, payload: &SubmissionPayload) -> Result<SinkResponse, TransportFailure>;
}

/// A successful submission.
#[derive(PartialEq, Debug, Clone)]
pub struct SubmissionReceipt {
    pub mode: String,
    pub response_id: String,
    pub payload: SubmissionPayload,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SubmitError {
    #[snafu(display("pages {pages:?} are incomplete"))]
    IncompletePages { pages: Vec<usize> },
    #[snafu(display("the submission is invalid: {}", errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(" | ")))]
    InvalidSubmission { errors: Vec<ValidationError> },
    /// The payload was kept under `backup_key`, unless the store refused it.
    #[snafu(display("the submission was not delivered (backup: {backup_key:?})"))]
    NotDelivered {
        backup_key: Option<String>,
        source: TransportFailure,
    },
    #[snafu(display("the sink rejected the submission: {message} (backup: {backup_key:?})"))]
    Rejected {
        backup_key: Option<String>,
        message: String,
    },
}

impl SubmitError {
    /// The key of the stored copy of an undelivered payload.
    pub fn backup_key(&self) -> Option<&str> {
        match self {
            SubmitError::NotDelivered { backup_key, .. } | SubmitError::Rejected { backup_key, .. } => {
                backup_key.as_deref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sink_responses() {
        let ok: SinkResponse = serde_json::from_value(json!({
            "status": "success", "mode": "v2", "message": "Response recorded", "responseId": "abc"
        }))
        .unwrap();
        assert_eq!(
            ok,
            SinkResponse::Success {
                mode: "v2".to_string(),
                message: "Response recorded".to_string(),
                response_id: "abc".to_string()
            }
        );
        let err: SinkResponse =
            serde_json::from_value(json!({"status": "error", "message": "boom"})).unwrap();
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "error", "message": "boom"})
        );
    }
}
