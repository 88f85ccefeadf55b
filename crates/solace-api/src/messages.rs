use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};

use solace_pipeline::{SendError, SendOutcome};
use solace_types::api::{MessageQuery, SendMessageRequest, SendMessageResponse};
use solace_types::ids::ConversationId;
use solace_types::models::StoredMessage;

use crate::AppStateInner;

/// The one mutating entry point: validate → moderate → append to exactly one
/// of the message log or the report sink. A flagged submission gets a 200
/// with `status: "flagged"` — processed but withheld, never an error and
/// never echoed into the conversation.
pub async fn send_message(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let outcome = state
        .pipeline
        .send_message(ConversationId::new(conversation_id), req.author_id, req.content)
        .await;

    match outcome {
        Ok(SendOutcome::Sent(message)) => {
            Ok((StatusCode::CREATED, Json(SendMessageResponse::Sent { message })))
        }
        Ok(SendOutcome::Flagged { reason }) => {
            Ok((StatusCode::OK, Json(SendMessageResponse::Flagged { reason })))
        }
        Err(SendError::InvalidMessage(why)) => {
            warn!("rejected invalid submission: {}", why);
            Err(StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            // ModerationUnavailable / StoreUnavailable — retryable by the client
            error!("send failed: {}", error_chain(&e));
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

pub async fn get_messages(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<StoredMessage>>, StatusCode> {
    let limit = query.limit.min(200);

    state
        .pipeline
        .read_ordered(ConversationId::new(conversation_id), query.after, Some(limit))
        .await
        .map(Json)
        .map_err(|e| {
            error!("history read failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })
}

fn error_chain(e: &SendError) -> String {
    use std::error::Error as _;
    match e.source() {
        Some(source) => format!("{e}: {source}"),
        None => e.to_string(),
    }
}
