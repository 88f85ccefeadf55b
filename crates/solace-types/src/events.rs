use serde::{Deserialize, Serialize};

use crate::ids::ConversationId;
use crate::models::StoredMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Subscription is attached; history follows as MessageCreate events,
    /// then the live stream, with no gap between them.
    Subscribed { conversation_id: ConversationId },

    /// A message in a subscribed conversation. Sent for both history replay
    /// and live appends — per conversation, always in seq order.
    MessageCreate { message: StoredMessage },

    /// Subscription ended server-side (e.g. the listener fell too far behind
    /// the live stream to be delivered without a gap).
    Unsubscribed { conversation_id: ConversationId },

    /// A client command could not be honored.
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start streaming a conversation: full history, then live appends.
    Subscribe { conversation_id: ConversationId },

    /// Stop streaming a conversation. In-flight deliveries are dropped.
    Unsubscribe { conversation_id: ConversationId },
}
