//! Lexicon stream subscriber writer
//!
//! One task per subscriber websocket. Events arrive on the bounded queue
//! (eviction happens at the broadcast side); this task just writes JSON
//! text frames, pings on a timer, and exits on cancellation, queue close,
//! or a failed write.

use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::constants::SUBSCRIBER_PING_INTERVAL_SECS;
use crate::domain::views::LexStreamEvent;

/// Write deadline for frames and pings.
const WRITE_DEADLINE: Duration = Duration::from_secs(5);

async fn send_with_deadline(socket: &mut WebSocket, message: WsMessage) -> bool {
    matches!(
        tokio::time::timeout(WRITE_DEADLINE, socket.send(message)).await,
        Ok(Ok(()))
    )
}

async fn send_event(socket: &mut WebSocket, event: &LexStreamEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => send_with_deadline(socket, WsMessage::Text(text.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "lex stream event failed to serialize");
            true
        }
    }
}

/// Drive one subscriber socket until it dies.
pub async fn run_subscriber(
    mut socket: WebSocket,
    mut queue: mpsc::Receiver<LexStreamEvent>,
    cancel: CancellationToken,
) {
    let mut ping = tokio::time::interval(Duration::from_secs(SUBSCRIBER_PING_INTERVAL_SECS));
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await;

    loop {
        tokio::select! {
            event = queue.recv() => {
                let Some(event) = event else { break };
                if !send_event(&mut socket, &event).await {
                    break;
                }
            }
            _ = ping.tick() => {
                if !send_with_deadline(&mut socket, WsMessage::Ping(Vec::new().into())).await {
                    break;
                }
            }
            _ = cancel.cancelled() => {
                // Flush whatever is already queued, then leave.
                while let Ok(event) = queue.try_recv() {
                    if !send_event(&mut socket, &event).await {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = socket.send(WsMessage::Close(None)).await;
}
