//! Content-safety gate in front of the conversation log.
//!
//! The classifier itself is an external capability — this crate only defines
//! the boundary ([`ModerationGate`]) and the HTTP adapter that calls a hosted
//! classifier. The gate is stateless and repeated calls with identical text
//! are not required to agree.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use solace_types::models::Verdict;

/// Any failure here means the submission is neither accepted nor reported —
/// the caller is told the send failed and may retry.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Synchronous request/response safety check. Callers guarantee non-empty
/// text; the gate guarantees a decision for every well-formed input or a
/// [`ModerationError`].
pub trait ModerationGate: Send + Sync {
    fn classify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Verdict, ModerationError>>;
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    flagged: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Adapter for an LLM-backed classifier behind a fixed JSON contract:
/// POST `{"input": <text>}`, response `{"flagged": bool, "reason": string?}`.
pub struct HttpModerationGate {
    client: reqwest::Client,
    url: String,
}

impl HttpModerationGate {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ModerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

impl ModerationGate for HttpModerationGate {
    fn classify<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Verdict, ModerationError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&ClassifyRequest { input: text })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ModerationError::Status(status));
            }

            let body: ClassifyResponse = response.json().await?;
            debug!(flagged = body.flagged, "classifier verdict received");

            Ok(Verdict {
                problematic: body.flagged,
                reason: body.reason,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_with_reason() {
        let body: ClassifyResponse =
            serde_json::from_str(r#"{"flagged": true, "reason": "hate speech"}"#).unwrap();
        assert!(body.flagged);
        assert_eq!(body.reason.as_deref(), Some("hate speech"));
    }

    #[test]
    fn response_parses_without_reason() {
        let body: ClassifyResponse = serde_json::from_str(r#"{"flagged": false}"#).unwrap();
        assert!(!body.flagged);
        assert!(body.reason.is_none());
    }

    #[test]
    fn request_encodes_input_field() {
        let json = serde_json::to_string(&ClassifyRequest { input: "hello" }).unwrap();
        assert_eq!(json, r#"{"input":"hello"}"#);
    }
}
