use chrono::{DateTime, Utc};
use anyhow::Result;
use rusqlite::Connection;
use solace_types::ids::{AuthorId, ConversationId};
use solace_types::models::Report;
use uuid::Uuid;

use crate::Database;
use crate::models::{MessageRow, ReportRow};

impl Database {
    // -- Messages (the per-conversation ordered log) --

    /// Append an accepted message and return its assigned sequence number.
    ///
    /// The seq is computed and inserted in a single statement under the
    /// connection lock, so it is strictly greater than every seq already in
    /// the conversation — even across concurrent callers.
    pub fn append_message(
        &self,
        conversation_id: &ConversationId,
        id: Uuid,
        author_id: &AuthorId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<u64> {
        self.with_conn(|conn| {
            let seq: i64 = conn.query_row(
                "INSERT INTO messages (conversation_id, seq, id, author_id, content, created_at)
                 VALUES (
                     ?1,
                     (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1),
                     ?2, ?3, ?4, ?5
                 )
                 RETURNING seq",
                rusqlite::params![
                    conversation_id.as_str(),
                    id.to_string(),
                    author_id.as_str(),
                    content,
                    created_at.to_rfc3339(),
                ],
                |row| row.get(0),
            )?;
            Ok(seq as u64)
        })
    }

    /// Read a conversation's log in ascending seq order, starting strictly
    /// after `after` (0 for the full history).
    pub fn get_messages(
        &self,
        conversation_id: &ConversationId,
        after: u64,
        limit: Option<u32>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id.as_str(), after, limit))
    }

    /// Highest assigned seq in a conversation, 0 if it has no messages yet.
    pub fn latest_seq(&self, conversation_id: &ConversationId) -> Result<u64> {
        self.with_conn(|conn| {
            let seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), 0) FROM messages WHERE conversation_id = ?1",
                [conversation_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(seq as u64)
        })
    }

    // -- Reports (the review queue) --

    pub fn append_report(&self, report: &Report) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (id, conversation_id, author_id, content, reason, reported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    report.id.to_string(),
                    report.conversation_id.as_str(),
                    report.author_id.as_str(),
                    report.content,
                    report.reason,
                    report.reported_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Oldest-first read of the review queue. Consumption (read then delete)
    /// belongs to the external review workflow, not this crate.
    pub fn list_reports(&self, limit: u32) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, author_id, content, reason, reported_at
                 FROM reports ORDER BY reported_at ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(ReportRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        author_id: row.get(2)?,
                        content: row.get(3)?,
                        reason: row.get(4)?,
                        reported_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_messages(
    conn: &Connection,
    conversation_id: &str,
    after: u64,
    limit: Option<u32>,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, author_id, content, seq, created_at
         FROM messages
         WHERE conversation_id = ?1 AND seq > ?2
         ORDER BY seq ASC
         LIMIT ?3",
    )?;
    // SQLite treats a negative LIMIT as "no limit"
    let limit = limit.map_or(-1i64, i64::from);
    let rows = stmt
        .query_map(rusqlite::params![conversation_id, after as i64, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                author_id: row.get(2)?,
                content: row.get(3)?,
                seq: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
