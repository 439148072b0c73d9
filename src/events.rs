//! Application callbacks and the ordering rules around them.
//!
//! Adapters never call the [`Handler`] directly; they go through [`Events`],
//! which enforces `connect < message* < disconnect` per connection.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::ClientError;
use crate::net::connection::ClientSocket;
use crate::observability::metrics;
use crate::writer::{ResponseWriter, TransportKind};

/// Application hooks for multiplexed connections.
///
/// Only [`on_message`](Handler::on_message) is required. Error and timeout
/// hooks destroy the connection unless overridden.
pub trait Handler: Send + Sync + 'static {
    /// A transport is ready to carry messages.
    fn on_connect(&self, _writer: &ResponseWriter, _socket: &ClientSocket) {}

    /// One framed message (or one WebSocket frame).
    fn on_message(&self, data: Bytes, writer: &ResponseWriter, socket: &ClientSocket);

    /// The connection is gone. Fires only after `on_connect`.
    fn on_disconnect(&self, _socket: &ClientSocket) {}

    fn on_client_error(&self, error: &ClientError, socket: &ClientSocket) {
        tracing::debug!(
            connection_id = %socket.id(),
            code = error.code(),
            error = %error,
            "Destroying connection after client error"
        );
        socket.destroy();
    }

    /// No bytes arrived within the read timeout.
    fn on_timeout(&self, socket: &ClientSocket) {
        socket.destroy();
    }
}

/// Per-connection event gate.
#[derive(Clone)]
pub(crate) struct Events {
    handler: Arc<dyn Handler>,
    socket: ClientSocket,
}

impl Events {
    pub fn new(handler: Arc<dyn Handler>, socket: ClientSocket) -> Self {
        Self { handler, socket }
    }

    pub fn socket(&self) -> &ClientSocket {
        &self.socket
    }

    /// Emit `connect` once. Returns false when suppressed.
    pub fn connect(&self, writer: &ResponseWriter) -> bool {
        if self.socket.is_destroyed() {
            return false;
        }
        let ctx = self.socket.context();
        if ctx.connect_emitted.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(
            connection_id = %self.socket.id(),
            transport = writer.transport().as_str(),
            "Client connected"
        );
        self.handler.on_connect(writer, &self.socket);
        true
    }

    pub fn message(&self, data: Bytes, writer: &ResponseWriter) {
        let ctx = self.socket.context();
        if !ctx.connect_emitted.load(Ordering::Acquire)
            || ctx.disconnect_emitted.load(Ordering::Acquire)
        {
            return;
        }
        let transport: TransportKind = writer.transport();
        metrics::record_message(transport);
        tracing::trace!(
            connection_id = %self.socket.id(),
            transport = transport.as_str(),
            len = data.len(),
            "Message received"
        );
        self.handler.on_message(data, writer, &self.socket);
    }

    /// Emit `disconnect` once, and only after a `connect`.
    pub fn disconnect(&self) {
        let ctx = self.socket.context();
        if !ctx.connect_emitted.load(Ordering::Acquire) {
            return;
        }
        if ctx.disconnect_emitted.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(connection_id = %self.socket.id(), "Client disconnected");
        self.handler.on_disconnect(&self.socket);
    }

    pub fn client_error(&self, error: ClientError) {
        metrics::record_client_error(error.code());
        tracing::debug!(
            connection_id = %self.socket.id(),
            code = error.code(),
            error = %error,
            "Client error"
        );
        self.handler.on_client_error(&error, &self.socket);
    }

    pub fn timeout(&self) {
        tracing::debug!(connection_id = %self.socket.id(), "Read timeout");
        self.handler.on_timeout(&self.socket);
    }
}
