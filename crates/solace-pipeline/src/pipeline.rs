use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use solace_db::Database;
use solace_moderation::{ModerationError, ModerationGate};
use solace_types::ids::{AuthorId, ConversationId};
use solace_types::models::{Report, StoredMessage};

use crate::subscription::{Subscription, SubscriptionHub};

/// Upper bound on message content, in bytes. Generous for chat; mostly a
/// guard against garbage submissions reaching the classifier.
pub const MAX_CONTENT_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum SendError {
    /// Rejected before any external call. Not retryable as-is.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The classifier call failed. Nothing was persisted anywhere; the
    /// caller may retry the whole submission.
    #[error("moderation unavailable")]
    ModerationUnavailable(#[source] ModerationError),

    /// The append failed after a successful classification. Retryable; a
    /// retry is a new submission and is classified again.
    #[error("store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidMessage(_))
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

/// Terminal state of an accepted submission. `Flagged` is success-shaped:
/// the content was processed but withheld and routed to review — it is never
/// echoed back into the conversation.
#[derive(Debug)]
pub enum SendOutcome {
    Sent(StoredMessage),
    Flagged { reason: Option<String> },
}

/// Orchestrates one submission from intake to terminal state:
/// validate → classify → append to exactly one of the message log or the
/// report sink → notify the caller.
///
/// Each submission is an independent task. Classification runs fully in
/// parallel across submissions, even within one conversation; only the
/// append is serialized, by the store's connection lock. The pipeline never
/// retries anything itself — retry policy belongs to the caller.
#[derive(Clone)]
pub struct MessagePipeline {
    db: Arc<Database>,
    gate: Arc<dyn ModerationGate>,
    hub: SubscriptionHub,
}

impl MessagePipeline {
    pub fn new(db: Arc<Database>, gate: Arc<dyn ModerationGate>) -> Self {
        Self {
            db,
            gate,
            hub: SubscriptionHub::new(),
        }
    }

    /// The only mutating entry point. Exactly one classifier call per
    /// invocation, and exactly one append (message or report) per terminal
    /// outcome — never both, never zero except on failure.
    ///
    /// Dropping the returned future abandons the submission: an in-flight
    /// classification result is discarded; once the append task has been
    /// spawned, the message commits and is published regardless.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        author_id: AuthorId,
        content: String,
    ) -> Result<SendOutcome, SendError> {
        if conversation_id.is_empty() {
            return Err(SendError::InvalidMessage("conversation id is empty"));
        }
        if author_id.is_empty() {
            return Err(SendError::InvalidMessage("author id is empty"));
        }
        if content.trim().is_empty() {
            return Err(SendError::InvalidMessage("content is empty"));
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(SendError::InvalidMessage("content too long"));
        }

        let verdict = self
            .gate
            .classify(&content)
            .await
            .map_err(SendError::ModerationUnavailable)?;

        if verdict.problematic {
            let report = Report {
                id: Uuid::new_v4(),
                conversation_id,
                author_id,
                content,
                reason: verdict.reason.clone(),
                reported_at: Utc::now(),
            };
            info!(
                conversation = %report.conversation_id,
                report = %report.id,
                "submission flagged, routing to review"
            );

            let db = self.db.clone();
            run_blocking(move || db.append_report(&report)).await?;

            return Ok(SendOutcome::Flagged { reason: verdict.reason });
        }

        // Accepted. Append and publish inside the same blocking task: once it
        // is spawned, both happen even if the caller goes away, so a commit
        // can never be silently missing from the live stream.
        let db = self.db.clone();
        let hub = self.hub.clone();
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let message = run_blocking(move || {
            let seq = db.append_message(&conversation_id, id, &author_id, &content, created_at)?;
            let message = StoredMessage {
                id,
                conversation_id,
                author_id,
                content,
                seq,
                created_at,
            };
            hub.publish(message.clone());
            Ok(message)
        })
        .await?;

        info!(
            conversation = %message.conversation_id,
            seq = message.seq,
            "message committed"
        );
        Ok(SendOutcome::Sent(message))
    }

    /// Live, ordered view over one conversation: full history first, then an
    /// unbroken stream of subsequent appends. Drop the handle to tear down.
    pub async fn subscribe(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Subscription, ReadError> {
        // Attach before the snapshot: anything committed after this point
        // arrives live, anything before is in the snapshot, and the overlap
        // is deduplicated by seq inside the handle.
        let rx = self.hub.attach(&conversation_id);

        let db = self.db.clone();
        let cid = conversation_id.clone();
        let history = tokio::task::spawn_blocking(move || -> anyhow::Result<VecDeque<StoredMessage>> {
            db.get_messages(&cid, 0, None)?
                .into_iter()
                .map(|row| row.into_model())
                .collect()
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ReadError::StoreUnavailable(anyhow::anyhow!(e))
        })?
        .map_err(ReadError::StoreUnavailable)?;

        Ok(Subscription::new(conversation_id, history, rx))
    }

    /// Ordered page of a conversation's log, ascending by seq.
    pub async fn read_ordered(
        &self,
        conversation_id: ConversationId,
        after: u64,
        limit: Option<u32>,
    ) -> Result<Vec<StoredMessage>, ReadError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<StoredMessage>> {
            db.get_messages(&conversation_id, after, limit)?
                .into_iter()
                .map(|row| row.into_model())
                .collect()
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ReadError::StoreUnavailable(anyhow::anyhow!(e))
        })?
        .map_err(ReadError::StoreUnavailable)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, SendError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            SendError::StoreUnavailable(anyhow::anyhow!(e))
        })?
        .map_err(SendError::StoreUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::BoxFuture;
    use solace_types::models::Verdict;

    /// Programmable classifier double that also counts calls.
    struct StaticGate {
        verdict: Verdict,
        calls: AtomicUsize,
    }

    impl StaticGate {
        fn clean() -> Arc<Self> {
            Arc::new(Self { verdict: Verdict::clean(), calls: AtomicUsize::new(0) })
        }

        fn flagging(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                verdict: Verdict::problematic(reason),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ModerationGate for StaticGate {
        fn classify<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Verdict, ModerationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let verdict = self.verdict.clone();
            Box::pin(async move { Ok(verdict) })
        }
    }

    /// Classifier double whose calls always fail, as on a timeout.
    struct FailingGate;

    impl ModerationGate for FailingGate {
        fn classify<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Verdict, ModerationError>> {
            Box::pin(async move {
                Err(ModerationError::Status(reqwest::StatusCode::GATEWAY_TIMEOUT))
            })
        }
    }

    fn pipeline(gate: Arc<dyn ModerationGate>) -> MessagePipeline {
        let db = Arc::new(Database::open_in_memory().unwrap());
        MessagePipeline::new(db, gate)
    }

    fn conv(id: &str) -> ConversationId {
        ConversationId::from(id)
    }

    #[tokio::test]
    async fn accepted_message_lands_in_log_exactly_once() {
        let p = pipeline(StaticGate::clean());

        let outcome = p
            .send_message(conv("c1"), AuthorId::from("alice"), "hello there".into())
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Sent(_)));

        let log = p.read_ordered(conv("c1"), 0, None).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].content, "hello there");
        assert_eq!(log[0].seq, 1);
    }

    #[tokio::test]
    async fn flagged_content_goes_only_to_the_report_sink() {
        let gate = StaticGate::flagging("hate speech");
        let db = Arc::new(Database::open_in_memory().unwrap());
        let p = MessagePipeline::new(db.clone(), gate);

        let outcome = p
            .send_message(conv("c1"), AuthorId::from("bob"), "<slur>".into())
            .await
            .unwrap();
        match outcome {
            SendOutcome::Flagged { reason } => assert_eq!(reason.as_deref(), Some("hate speech")),
            other => panic!("expected Flagged, got {other:?}"),
        }

        let log = p.read_ordered(conv("c1"), 0, None).await.unwrap();
        assert!(log.is_empty(), "rejected content must never reach the log");

        let reports = db.list_reports(10).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].content, "<slur>");
        assert_eq!(reports[0].reason.as_deref(), Some("hate speech"));
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_classifier() {
        let gate = StaticGate::clean();
        let p = pipeline(gate.clone());

        let cases = [
            (conv("c1"), AuthorId::from("alice"), "   ".to_string()),
            (conv("c1"), AuthorId::from("alice"), String::new()),
            (conv(""), AuthorId::from("alice"), "hi".to_string()),
            (conv("c1"), AuthorId::from(""), "hi".to_string()),
            (conv("c1"), AuthorId::from("alice"), "x".repeat(MAX_CONTENT_LEN + 1)),
        ];
        for (c, a, text) in cases {
            let err = p.send_message(c, a, text).await.unwrap_err();
            assert!(matches!(err, SendError::InvalidMessage(_)));
            assert!(!err.is_retryable());
        }

        assert_eq!(gate.call_count(), 0);
        assert!(p.read_ordered(conv("c1"), 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn classifier_runs_exactly_once_per_submission() {
        let gate = StaticGate::clean();
        let p = pipeline(gate.clone());

        p.send_message(conv("c1"), AuthorId::from("alice"), "hi".into())
            .await
            .unwrap();
        assert_eq!(gate.call_count(), 1);
    }

    #[tokio::test]
    async fn classifier_failure_persists_nothing() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let p = MessagePipeline::new(db.clone(), Arc::new(FailingGate));

        let err = p
            .send_message(conv("c1"), AuthorId::from("alice"), "hello".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ModerationUnavailable(_)));
        assert!(err.is_retryable());

        assert!(p.read_ordered(conv("c1"), 0, None).await.unwrap().is_empty());
        assert!(db.list_reports(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscriber_sees_history_then_live_in_order() {
        let p = pipeline(StaticGate::clean());

        p.send_message(conv("c1"), AuthorId::from("alice"), "before".into())
            .await
            .unwrap();

        let mut sub = p.subscribe(conv("c1")).await.unwrap();

        p.send_message(conv("c1"), AuthorId::from("bob"), "after".into())
            .await
            .unwrap();

        assert_eq!(sub.recv().await.unwrap().content, "before");
        assert_eq!(sub.recv().await.unwrap().content, "after");
    }

    #[tokio::test]
    async fn two_subscribers_observe_identical_sequences() {
        let p = pipeline(StaticGate::clean());
        for i in 0..4 {
            p.send_message(conv("c1"), AuthorId::from("alice"), format!("msg {i}"))
                .await
                .unwrap();
        }

        let mut first = p.subscribe(conv("c1")).await.unwrap();
        let mut second = p.subscribe(conv("c1")).await.unwrap();
        for _ in 0..4 {
            let a = first.recv().await.unwrap();
            let b = second.recv().await.unwrap();
            assert_eq!(a.seq, b.seq);
            assert_eq!(a.content, b.content);
        }
    }

    #[tokio::test]
    async fn concurrent_sends_commit_with_strictly_increasing_seqs() {
        let p = pipeline(StaticGate::clean());
        let mut sub = p.subscribe(conv("c2")).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let p = p.clone();
            let author = AuthorId::new(format!("author-{i}"));
            tasks.push(tokio::spawn(async move {
                p.send_message(conv("c2"), author, format!("msg {i}")).await
            }));
        }
        for task in tasks {
            assert!(matches!(task.await.unwrap().unwrap(), SendOutcome::Sent(_)));
        }

        let log = p.read_ordered(conv("c2"), 0, None).await.unwrap();
        assert_eq!(log.len(), 8);
        for (msg, expected) in log.iter().zip(1u64..) {
            assert_eq!(msg.seq, expected);
        }

        // The pre-attached listener observes the same committed order.
        for expected in 1u64..=8 {
            assert_eq!(sub.recv().await.unwrap().seq, expected);
        }
    }

    #[tokio::test]
    async fn teardown_stops_delivery_and_resubscribe_replays() {
        let p = pipeline(StaticGate::clean());

        let sub = p.subscribe(conv("c1")).await.unwrap();
        drop(sub);

        p.send_message(conv("c1"), AuthorId::from("alice"), "hello".into())
            .await
            .unwrap();

        let mut again = p.subscribe(conv("c1")).await.unwrap();
        assert_eq!(again.recv().await.unwrap().content, "hello");
    }
}
