use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AuthorId, ConversationId};

/// A message that passed moderation and was committed to its conversation's
/// log. Messages are immutable once appended — there is no edit or delete.
///
/// `seq` is the server-assigned per-conversation timestamp: strictly
/// increasing, never client-supplied. `created_at` is wall clock and only
/// informational; ordering is always by `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub author_id: AuthorId,
    pub content: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

/// A rejected submission, routed to the review queue instead of the
/// conversation. The original content lives only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub author_id: AuthorId,
    pub content: String,
    pub reason: Option<String>,
    pub reported_at: DateTime<Utc>,
}

/// Classifier decision for one piece of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub problematic: bool,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn clean() -> Self {
        Self { problematic: false, reason: None }
    }

    pub fn problematic(reason: impl Into<String>) -> Self {
        Self { problematic: true, reason: Some(reason.into()) }
    }
}
