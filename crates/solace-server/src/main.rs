use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use solace_api::{AppState, AppStateInner, messages};
use solace_gateway::connection;
use solace_moderation::HttpModerationGate;
use solace_pipeline::MessagePipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solace=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("SOLACE_DB_PATH").unwrap_or_else(|_| "solace.db".into());
    let host = std::env::var("SOLACE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SOLACE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let moderation_url = std::env::var("SOLACE_MODERATION_URL")
        .unwrap_or_else(|_| "http://localhost:8787/classify".into());
    let moderation_timeout_ms: u64 = std::env::var("SOLACE_MODERATION_TIMEOUT_MS")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;

    // Init database
    let db = Arc::new(solace_db::Database::open(&PathBuf::from(&db_path))?);

    // Moderation gate + pipeline
    let gate = Arc::new(HttpModerationGate::new(
        moderation_url.clone(),
        Duration::from_millis(moderation_timeout_ms),
    )?);
    info!("Moderation classifier at {}", moderation_url);

    let pipeline = MessagePipeline::new(db, gate);
    let app_state: AppState = Arc::new(AppStateInner { pipeline: pipeline.clone() });

    // Routes
    let rest_routes = Router::new()
        .route("/conversations/{conversation_id}/messages", get(messages::get_messages))
        .route("/conversations/{conversation_id}/messages", post(messages::send_message))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(pipeline);

    let app = Router::new()
        .merge(rest_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Solace server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(pipeline): State<MessagePipeline>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, pipeline))
}
