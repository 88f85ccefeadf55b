/// Database row types — these map directly to SQLite rows.
/// Distinct from solace-types models to keep the DB layer independent.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use solace_types::ids::{AuthorId, ConversationId};
use solace_types::models::{Report, StoredMessage};

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub author_id: String,
    pub content: String,
    pub seq: i64,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_model(self) -> Result<StoredMessage> {
        Ok(StoredMessage {
            id: self.id.parse().with_context(|| format!("corrupt message id '{}'", self.id))?,
            conversation_id: ConversationId::new(self.conversation_id),
            author_id: AuthorId::new(self.author_id),
            content: self.content,
            seq: u64::try_from(self.seq).context("negative seq")?,
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .with_context(|| format!("corrupt created_at '{}'", self.created_at))?,
        })
    }
}

pub struct ReportRow {
    pub id: String,
    pub conversation_id: String,
    pub author_id: String,
    pub content: String,
    pub reason: Option<String>,
    pub reported_at: String,
}

impl ReportRow {
    pub fn into_model(self) -> Result<Report> {
        Ok(Report {
            id: self.id.parse().with_context(|| format!("corrupt report id '{}'", self.id))?,
            conversation_id: ConversationId::new(self.conversation_id),
            author_id: AuthorId::new(self.author_id),
            content: self.content,
            reason: self.reason,
            reported_at: self
                .reported_at
                .parse::<DateTime<Utc>>()
                .with_context(|| format!("corrupt reported_at '{}'", self.reported_at))?,
        })
    }
}
