use serde::{Deserialize, Serialize};

use crate::ids::AuthorId;
use crate::models::StoredMessage;

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub author_id: AuthorId,
    pub content: String,
}

/// Outcome of a send. `Flagged` is success-shaped: the submission was
/// processed, but the content was withheld from the conversation and routed
/// to review. The original text is never echoed back.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendMessageResponse {
    Sent { message: StoredMessage },
    Flagged { reason: Option<String> },
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Cursor: return messages with seq strictly greater than this.
    #[serde(default)]
    pub after: u64,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}
