//! The axum-facing half of the connection handshake described in §4.8:
//! upgrade, authenticate within `AUTH_HANDSHAKE_TIMEOUT`, then shuttle
//! frames to and from the session actor until the socket closes.
//!
//! Grounded on the teacher's extension-based `Router` wiring
//! (`Extension<T>` layers rather than one `AppState` struct), generalized
//! from short-lived request/response handlers to a long-lived duplex
//! connection with its own send and receive tasks.

use crate::clock::SharedClock;
use crate::constants::{AUTH_HANDSHAKE_TIMEOUT, MAX_MESSAGE_BYTES};
use crate::errors::{AppError, AppErrorCode};
use crate::events::{AuthenticatePayload, ErrorPayload, InboundEvent, OutboundEvent};
use crate::registry::SharedRegistry;
use crate::session::coordinator::{ConnectRequest, CoordinatorMessage};
use crate::token::{Role, TokenIssuer};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Extension, Path};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(join_code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(registry): Extension<SharedRegistry>,
    Extension(tokens): Extension<Arc<TokenIssuer>>,
    Extension(clock): Extension<SharedClock>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, join_code, addr, registry, tokens, clock))
}

async fn handle_socket(
    mut socket: WebSocket,
    join_code: String,
    addr: SocketAddr,
    registry: SharedRegistry,
    tokens: Arc<TokenIssuer>,
    clock: SharedClock,
) {
    let Some(handle) = registry.get_by_join_code(&join_code) else {
        let _ = socket
            .send(encode(&OutboundEvent::error(
                AppErrorCode::InvalidJoinCode,
                AppErrorCode::InvalidJoinCode.message(),
            )))
            .await;
        return;
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel(64);

    let first_frame = tokio::time::timeout(AUTH_HANDSHAKE_TIMEOUT, socket.next()).await;
    let payload = match first_frame {
        Ok(Some(Ok(Message::Text(text)))) if text.len() <= MAX_MESSAGE_BYTES => {
            match serde_json::from_str::<InboundEvent>(&text) {
                Ok(InboundEvent::Authenticate(payload)) => payload,
                _ => {
                    let _ = socket
                        .send(encode(&OutboundEvent::error(
                            AppErrorCode::MissingToken,
                            "first frame must be authenticate",
                        )))
                        .await;
                    return;
                }
            }
        }
        _ => {
            let _ = socket
                .send(encode(&OutboundEvent::error(
                    AppErrorCode::MissingToken,
                    "authentication handshake timed out",
                )))
                .await;
            return;
        }
    };

    let request = match build_connect_request(payload, &addr, &handle.session_id, &tokens, &clock, outbound_tx.clone()) {
        Ok(request) => request,
        Err(error) => {
            let _ = socket
                .send(encode(&OutboundEvent::AuthError(ErrorPayload {
                    code: error.code,
                    message: error.message,
                })))
                .await;
            return;
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .inbox
        .send(CoordinatorMessage::Connect { request, reply: reply_tx })
        .await
        .is_err()
    {
        let _ = socket
            .send(encode(&OutboundEvent::error(AppErrorCode::SessionNotFound, "session is no longer running")))
            .await;
        return;
    }

    let connection_id = match reply_rx.await {
        Ok(Ok((connection_id, _subject))) => connection_id,
        Ok(Err(error)) => {
            let _ = socket
                .send(encode(&OutboundEvent::AuthError(ErrorPayload {
                    code: error.code,
                    message: error.message,
                })))
                .await;
            return;
        }
        Err(_) => return,
    };

    info!(join_code, connection_id, %addr, "connection authenticated");

    let (mut sink, mut stream) = socket.split();
    let inbox = handle.inbox.clone();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            if sink.send(encode(&event)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) if text.len() <= MAX_MESSAGE_BYTES => {
                    match serde_json::from_str::<InboundEvent>(&text) {
                        Ok(event) => {
                            if inbox.send(CoordinatorMessage::Inbound { connection_id, event }).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => warn!(%error, connection_id, "dropping malformed inbound frame"),
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        let _ = inbox.send(CoordinatorMessage::Disconnect { connection_id }).await;
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// Builds the actor-facing `ConnectRequest` from the client's first frame. A
/// `token` authenticates a host/bigscreen connection or a participant's own
/// reconnect; a bare `nickname` is how a participant joins for the first
/// time, since nobody can hold a token for an identity that doesn't exist
/// yet (§4.8 generalizes this from the abstract `{ token, sessionId, role }`
/// handshake spec.md describes, since a brand-new participant has none of
/// the three).
fn build_connect_request(
    payload: AuthenticatePayload,
    addr: &SocketAddr,
    session_id: &str,
    tokens: &TokenIssuer,
    clock: &SharedClock,
    outbound: mpsc::Sender<OutboundEvent>,
) -> Result<ConnectRequest, AppError> {
    if let Some(token) = payload.token {
        let claims = tokens.verify(&token, clock.now_millis())?;
        if claims.session_id != session_id {
            return Err(AppError::new(AppErrorCode::Unauthorized));
        }
        return Ok(ConnectRequest {
            role: claims.role,
            subject: Some(claims.subject),
            nickname: None,
            client_addr: Some(addr.ip().to_string()),
            outbound,
        });
    }

    if let Some(nickname) = payload.nickname {
        return Ok(ConnectRequest {
            role: Role::Participant,
            subject: None,
            nickname: Some(nickname),
            client_addr: Some(addr.ip().to_string()),
            outbound,
        });
    }

    Err(AppError::new(AppErrorCode::MissingToken))
}

fn encode(event: &OutboundEvent) -> Message {
    match serde_json::to_string(event) {
        Ok(text) => Message::Text(text),
        Err(error) => {
            tracing::error!(%error, "failed to encode outbound event");
            Message::Text(r#"{"type":"error","code":"Internal","message":"encode failure"}"#.to_owned())
        }
    }
}
