use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use guidely_relay::{ConnectionId, Dispatch, OutboundFrame, OutboundText, RelayError};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::middleware::decode_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /v1/ws?token=...
/// Browsers cannot set headers on the upgrade, so the bearer token rides in the query.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = params
        .token
        .ok_or_else(|| AppError::AuthenticationError("Missing token".to_string()))?;
    let user = decode_token(&state.auth.secret, &token)?;

    // Reserve the relay slot before upgrading; a full relay answers 503.
    let (conn, outbound) = state.relay.connect(user.user_id).await.map_err(|e| match e {
        RelayError::AtCapacity(_) => AppError::Unavailable("Too many realtime connections".to_string()),
        other => AppError::InternalServerError(other.to_string()),
    })?;
    state.metrics.relay_connections.inc();

    let relay = state.relay.clone();
    let metrics = state.metrics.clone();
    Ok(ws
        .on_failed_upgrade(move |e| {
            warn!("Realtime upgrade for connection {} failed: {}", conn, e);
            tokio::spawn(async move {
                relay.close(conn).await;
                metrics.relay_connections.dec();
            });
        })
        .on_upgrade(move |socket| handle_socket(socket, state, conn, outbound, user.user_id)))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    conn: ConnectionId,
    mut outbound: mpsc::UnboundedReceiver<OutboundText>,
    user_id: i64,
) {
    info!("Realtime connection {} established for user {}", conn, user_id);

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let relay = state.relay.clone();
    let metrics = state.metrics.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match relay.handle_frame(conn, text.as_str()).await {
                    Ok(Dispatch::Broadcast { delivered, .. }) => {
                        metrics.relay_frames_delivered.inc_by(delivered as u64);
                    }
                    Ok(Dispatch::Joined { .. }) => {}
                    Err(e) => {
                        debug!("Frame from {} rejected: {}", conn, e);
                        relay.send_to(conn, &OutboundFrame::Error { message: e.to_string() }).await;
                    }
                },
                Message::Close(_) => break,
                // Pings are answered by axum; binary frames are not part of the protocol.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.relay.close(conn).await;
    state.metrics.relay_connections.dec();
    info!("Realtime connection {} closed", conn);
}
