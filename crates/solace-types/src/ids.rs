use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partition key for an ordered message log. Opaque to the pipeline — the
/// constructors below are conveniences for callers, not something the
/// pipeline ever inspects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id for a 1:1 conversation. Order-independent: the two
    /// participant handles are sorted before joining, so both sides derive
    /// the same id.
    pub fn direct(a: &AuthorId, b: &AuthorId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a.as_str(), b.as_str())
        } else {
            (b.as_str(), a.as_str())
        };
        Self(format!("dm:{lo}:{hi}"))
    }

    /// Assigned id for a group/room conversation.
    pub fn room(id: Uuid) -> Self {
        Self(format!("room:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque author handle. May be a registered user id or a session-scoped
/// pseudonymous handle — identity semantics belong entirely to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_id_is_order_independent() {
        let alice = AuthorId::new("alice");
        let bob = AuthorId::new("bob");
        assert_eq!(
            ConversationId::direct(&alice, &bob),
            ConversationId::direct(&bob, &alice)
        );
    }

    #[test]
    fn direct_ids_differ_per_pair() {
        let a = AuthorId::new("alice");
        let b = AuthorId::new("bob");
        let c = AuthorId::new("carol");
        assert_ne!(
            ConversationId::direct(&a, &b),
            ConversationId::direct(&a, &c)
        );
    }
}
