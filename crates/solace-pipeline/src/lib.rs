//! The moderated conversation pipeline: validate, classify, then append to
//! exactly one of the message log or the report sink, fanning out accepted
//! messages to live subscribers in committed order.

pub mod pipeline;
pub mod subscription;

pub use pipeline::{MessagePipeline, SendError, SendOutcome, ReadError};
pub use subscription::{Subscription, SubscriptionHub};
