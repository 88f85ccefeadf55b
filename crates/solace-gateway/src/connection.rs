use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use solace_pipeline::MessagePipeline;
use solace_types::events::{GatewayCommand, GatewayEvent};
use solace_types::ids::ConversationId;

/// Heartbeat interval: server sends a Ping so dead connections get torn
/// down by the socket layer instead of lingering.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection.
///
/// The client drives everything with Subscribe/Unsubscribe commands. Each
/// subscription gets its own forwarding task holding a pipeline
/// `Subscription` handle; aborting the task drops the handle, which is the
/// teardown path — no deliveries after that, even in-flight ones.
pub async fn handle_connection(socket: WebSocket, pipeline: MessagePipeline) {
    let (mut sender, mut receiver) = socket.split();

    info!("client connected to gateway");

    // All outbound events funnel through one channel so each conversation's
    // messages reach the socket in the order its forwarding task sent them.
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewayEvent>();

    // Writer: events -> socket, plus heartbeat pings
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: client commands
    let mut recv_task = tokio::spawn(async move {
        let mut forwards: HashMap<ConversationId, JoinHandle<()>> = HashMap::new();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&pipeline, &tx, &mut forwards, cmd).await,
                    Err(e) => {
                        warn!("bad command: {} -- raw: {}", e, &text[..text.len().min(200)]);
                        let _ = tx.send(GatewayEvent::Error {
                            message: "unrecognized command".into(),
                        });
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        for (_, handle) in forwards {
            handle.abort();
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("client disconnected from gateway");
}

async fn handle_command(
    pipeline: &MessagePipeline,
    tx: &mpsc::UnboundedSender<GatewayEvent>,
    forwards: &mut HashMap<ConversationId, JoinHandle<()>>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Subscribe { conversation_id } => {
            if forwards.contains_key(&conversation_id) {
                let _ = tx.send(GatewayEvent::Error {
                    message: format!("already subscribed to {conversation_id}"),
                });
                return;
            }

            let mut sub = match pipeline.subscribe(conversation_id.clone()).await {
                Ok(sub) => sub,
                Err(e) => {
                    warn!("subscribe to {} failed: {}", conversation_id, e);
                    let _ = tx.send(GatewayEvent::Error {
                        message: format!("subscription to {conversation_id} failed"),
                    });
                    return;
                }
            };

            info!("subscribed to {}", conversation_id);
            let _ = tx.send(GatewayEvent::Subscribed {
                conversation_id: conversation_id.clone(),
            });

            let tx = tx.clone();
            let cid = conversation_id.clone();
            let handle = tokio::spawn(async move {
                while let Some(message) = sub.recv().await {
                    if tx.send(GatewayEvent::MessageCreate { message }).is_err() {
                        return;
                    }
                }
                // Stream ended server-side (listener lagged past the buffer,
                // or shutdown). Tell the client so it can resubscribe.
                let _ = tx.send(GatewayEvent::Unsubscribed { conversation_id: cid });
            });
            forwards.insert(conversation_id, handle);
        }

        GatewayCommand::Unsubscribe { conversation_id } => {
            match forwards.remove(&conversation_id) {
                Some(handle) => {
                    handle.abort();
                    info!("unsubscribed from {}", conversation_id);
                    let _ = tx.send(GatewayEvent::Unsubscribed { conversation_id });
                }
                None => {
                    let _ = tx.send(GatewayEvent::Error {
                        message: format!("not subscribed to {conversation_id}"),
                    });
                }
            }
        }
    }
}
