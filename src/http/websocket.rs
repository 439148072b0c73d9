//! WebSocket transport over an upgraded HTTP connection.
//!
//! # Responsibilities
//! - Detect upgrade requests
//! - Re-check the origin once the handshake is done (close 1008 on mismatch)
//! - Deliver each non-empty text or binary frame as one message
//! - Turn writer commands into frames and the close handshake
//!
//! # Design Decisions
//! - Ping/pong is answered by tungstenite, never surfaced
//! - A rejected origin fires no application events

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap};
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;

use crate::config::Settings;
use crate::error::ClientError;
use crate::events::Events;
use crate::writer::{Command, Payload, ResponseWriter, TransportKind};

/// An accepted upgrade waiting for hyper to release the connection.
pub(crate) struct PendingUpgrade {
    pub on_upgrade: OnUpgrade,
    pub origin: Option<String>,
}

fn header_has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

pub(crate) fn is_upgrade_request(req: &Request<Incoming>) -> bool {
    is_upgrade(req.method(), req.headers())
}

fn is_upgrade(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::GET
        && header_has_token(headers, header::CONNECTION, "upgrade")
        && header_has_token(headers, header::UPGRADE, "websocket")
}

pub(crate) async fn serve(pending: PendingUpgrade, events: Events, settings: &Settings) {
    let socket = events.socket().clone();
    let upgraded = match pending.on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            events.client_error(ClientError::Http(e));
            return;
        }
    };
    let mut ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;

    if !settings.origin_allowed(pending.origin.as_deref()) {
        tracing::debug!(
            connection_id = %socket.id(),
            origin = ?pending.origin,
            "WebSocket origin rejected"
        );
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: Utf8Bytes::from_static("origin not allowed"),
        };
        let _ = ws.close(Some(frame)).await;
        return;
    }

    let (writer, mut commands) = ResponseWriter::new(TransportKind::WebSocket, socket.clone());
    if !events.connect(&writer) {
        return;
    }

    let mut closing = false;
    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                    let data: Bytes = msg.into_data();
                    if !data.is_empty() {
                        events.message(data, &writer);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => break,
                Some(Err(e)) => {
                    events.client_error(ClientError::WebSocket(e));
                    break;
                }
            },
            command = commands.recv(), if !closing => match command {
                Some(Command::Data(payload)) => {
                    let frame = match payload {
                        Payload::Text(text) => Message::text(text),
                        Payload::Binary(data) => Message::binary(data),
                    };
                    if let Err(e) = ws.send(frame).await {
                        events.client_error(ClientError::WebSocket(e));
                        break;
                    }
                }
                Some(Command::End) | None => {
                    closing = true;
                    // wait for the peer's close frame
                    if ws.close(None).await.is_err() {
                        break;
                    }
                }
                Some(Command::Destroy) => break,
                Some(Command::Head(_)) => {}
            },
        }
    }
    writer.end();
    events.disconnect();
}
