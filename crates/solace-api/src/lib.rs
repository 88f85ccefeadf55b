pub mod messages;

use solace_pipeline::MessagePipeline;

/// Shared state behind every REST handler.
pub struct AppStateInner {
    pub pipeline: MessagePipeline,
}

pub type AppState = std::sync::Arc<AppStateInner>;
