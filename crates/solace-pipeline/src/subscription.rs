use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::warn;

use solace_types::ids::ConversationId;
use solace_types::models::StoredMessage;

/// Per-listener buffer: a listener lagging more than this many messages
/// behind the live stream is cut off rather than delivered with a gap.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Fan-out point for committed messages. One broadcast channel per
/// conversation; `publish` is synchronous and non-blocking, so the pipeline
/// can call it from inside the store's append task without holding anything
/// across a suspension point.
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    conversations: RwLock<HashMap<ConversationId, broadcast::Sender<StoredMessage>>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                conversations: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Publish a committed message to every live listener on its
    /// conversation. A conversation nobody listens to has no channel; late
    /// subscribers pick the message up from the store's history instead.
    pub fn publish(&self, message: StoredMessage) {
        let tx = {
            let conversations = self
                .inner
                .conversations
                .read()
                .expect("subscription hub lock poisoned");
            conversations.get(&message.conversation_id).cloned()
        };

        let Some(tx) = tx else { return };

        let conversation_id = message.conversation_id.clone();
        if tx.send(message).is_err() {
            // Last listener went away since we looked — drop the channel.
            let mut conversations = self
                .inner
                .conversations
                .write()
                .expect("subscription hub lock poisoned");
            if let Some(stored) = conversations.get(&conversation_id) {
                if stored.receiver_count() == 0 {
                    conversations.remove(&conversation_id);
                }
            }
        }
    }

    /// Attach a live receiver for a conversation, creating its channel on
    /// first use. Called *before* the history snapshot so that no append can
    /// fall between history and the live stream.
    pub(crate) fn attach(&self, conversation_id: &ConversationId) -> broadcast::Receiver<StoredMessage> {
        let mut conversations = self
            .inner
            .conversations
            .write()
            .expect("subscription hub lock poisoned");
        conversations
            .entry(conversation_id.clone())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
            .subscribe()
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live, ordered view over one conversation: the full history first, then
/// an unbroken stream of subsequent appends in committed (`seq`) order.
///
/// Dropping the handle is the teardown path — delivery stops immediately,
/// including anything in flight, regardless of how the call site exits.
pub struct Subscription {
    conversation_id: ConversationId,
    history: VecDeque<StoredMessage>,
    rx: broadcast::Receiver<StoredMessage>,
    /// Next live seq owed to the listener. Live arrivals below this are
    /// duplicates of history; above it, commits whose publications overtook
    /// an earlier one — parked until the gap fills.
    next_seq: u64,
    pending: BTreeMap<u64, StoredMessage>,
}

impl Subscription {
    pub(crate) fn new(
        conversation_id: ConversationId,
        history: VecDeque<StoredMessage>,
        rx: broadcast::Receiver<StoredMessage>,
    ) -> Self {
        let next_seq = history.back().map_or(1, |m| m.seq + 1);
        Self {
            conversation_id,
            history,
            rx,
            next_seq,
            pending: BTreeMap::new(),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Next message in order. `None` means the stream is over: the hub went
    /// away, or this listener lagged too far behind to continue without a
    /// gap — resubscribe to recover via history replay.
    pub async fn recv(&mut self) -> Option<StoredMessage> {
        if let Some(message) = self.history.pop_front() {
            return Some(message);
        }

        loop {
            if let Some(message) = self.pending.remove(&self.next_seq) {
                self.next_seq += 1;
                return Some(message);
            }

            match self.rx.recv().await {
                Ok(message) => {
                    if message.seq < self.next_seq {
                        // Already delivered as part of the history snapshot.
                        continue;
                    }
                    if message.seq == self.next_seq {
                        self.next_seq += 1;
                        return Some(message);
                    }
                    self.pending.insert(message.seq, message);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        conversation = %self.conversation_id,
                        missed = n,
                        "subscription lagged, ending stream"
                    );
                    return None;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use solace_types::ids::AuthorId;
    use uuid::Uuid;

    fn message(conv: &str, seq: u64, content: &str) -> StoredMessage {
        StoredMessage {
            id: Uuid::new_v4(),
            conversation_id: ConversationId::from(conv),
            author_id: AuthorId::from("alice"),
            content: content.into(),
            seq,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn history_is_delivered_before_live() {
        let hub = SubscriptionHub::new();
        let conv = ConversationId::from("c1");
        let history: VecDeque<_> = vec![message("c1", 1, "one"), message("c1", 2, "two")].into();
        let rx = hub.attach(&conv);
        let mut sub = Subscription::new(conv, history, rx);

        hub.publish(message("c1", 3, "three"));

        assert_eq!(sub.recv().await.unwrap().content, "one");
        assert_eq!(sub.recv().await.unwrap().content, "two");
        assert_eq!(sub.recv().await.unwrap().content, "three");
    }

    #[tokio::test]
    async fn out_of_order_publication_is_resequenced() {
        let hub = SubscriptionHub::new();
        let conv = ConversationId::from("c1");
        let rx = hub.attach(&conv);
        let mut sub = Subscription::new(conv, VecDeque::new(), rx);

        // Two commits whose publish steps interleaved.
        hub.publish(message("c1", 2, "second"));
        hub.publish(message("c1", 1, "first"));

        let a = sub.recv().await.unwrap();
        let b = sub.recv().await.unwrap();
        assert_eq!((a.seq, b.seq), (1, 2));
    }

    #[tokio::test]
    async fn live_duplicates_of_history_are_dropped() {
        let hub = SubscriptionHub::new();
        let conv = ConversationId::from("c1");
        let history: VecDeque<_> = vec![message("c1", 1, "one")].into();
        let rx = hub.attach(&conv);
        let mut sub = Subscription::new(conv, history, rx);

        // Commit of seq 1 published after the snapshot was taken.
        hub.publish(message("c1", 1, "one"));
        hub.publish(message("c1", 2, "two"));

        assert_eq!(sub.recv().await.unwrap().seq, 1);
        assert_eq!(sub.recv().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn listeners_are_isolated_per_conversation() {
        let hub = SubscriptionHub::new();
        let c1 = ConversationId::from("c1");
        let rx = hub.attach(&c1);
        let mut sub = Subscription::new(c1, VecDeque::new(), rx);

        hub.publish(message("c2", 1, "other room"));
        hub.publish(message("c1", 1, "mine"));

        assert_eq!(sub.recv().await.unwrap().content, "mine");
    }

    #[tokio::test]
    async fn publish_without_listeners_is_a_no_op() {
        let hub = SubscriptionHub::new();
        hub.publish(message("c1", 1, "nobody home"));
    }
}
