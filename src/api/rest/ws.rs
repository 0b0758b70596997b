use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    /// Topic to watch (`order_<id>`, `tracking_<id>`, `user_<id>`,
    /// `orders_feed`). Absent means the full firehose.
    pub topic: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state, query.topic))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, topic: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let rx = state.realtime.subscribe();

    info!(topic = topic.as_deref().unwrap_or("*"), "websocket client connected");

    let send_task = tokio::spawn(async move {
        let mut stream = BroadcastStream::new(rx);

        while let Some(event) = stream.next().await {
            // A lagged receiver skips what it missed; consumers already
            // tolerate gaps and duplicates.
            let Ok(envelope) = event else { continue };

            if let Some(topic) = &topic {
                if &envelope.topic != topic {
                    continue;
                }
            }

            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize envelope for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
