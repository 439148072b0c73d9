//! Transport-agnostic response writer.
//!
//! A [`ResponseWriter`] is a handle the application keeps for as long as it
//! likes. It never touches the socket itself: every operation becomes a
//! [`Command`] on a channel drained by the adapter that owns the transport.
//! The writer's state machine guarantees at most one end per connection no
//! matter how the application calls it.
//!
//! ```text
//! Active ──end_after_next_write──▶ PendingEnd ──write──▶ Ended
//!   │                                  │
//!   └───────────── end / destroy ──────┴──────────────▶ Ended
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::net::connection::ClientSocket;

/// Transport a writer delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Raw,
    Http,
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Raw => "raw",
            TransportKind::Http => "http",
            TransportKind::WebSocket => "websocket",
        }
    }
}

/// Data handed to [`ResponseWriter::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Bytes),
    Text(String),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Binary(b) => b.len(),
            Payload::Text(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Binary(b) => b,
            Payload::Text(s) => Bytes::from(s),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Binary(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(b: &'static [u8]) -> Self {
        Payload::Binary(Bytes::from_static(b))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("response already ended")]
    Ended,
    #[error("transport closed")]
    Closed,
}

/// Staged HTTP response head.
#[derive(Debug, Clone)]
pub(crate) struct Head {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Instruction for the adapter that owns the transport.
#[derive(Debug)]
pub(crate) enum Command {
    Head(Box<Head>),
    Data(Payload),
    End,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Active,
    PendingEnd,
    Ended,
}

#[derive(Debug)]
struct Inner {
    kind: TransportKind,
    state: WriterState,
    tx: Option<mpsc::UnboundedSender<Command>>,
    head: Head,
    headers_sent: bool,
    binary: bool,
}

/// Handle for answering one connection (or one HTTP request).
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    inner: Arc<Mutex<Inner>>,
    socket: ClientSocket,
}

impl ResponseWriter {
    pub(crate) fn new(
        kind: TransportKind,
        socket: ClientSocket,
    ) -> (Self, mpsc::UnboundedReceiver<Command>) {
        Self::with_head(kind, socket, HeaderMap::new())
    }

    /// HTTP writer with headers staged ahead of the application's own.
    pub(crate) fn with_head(
        kind: TransportKind,
        socket: ClientSocket,
        headers: HeaderMap,
    ) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            kind,
            state: WriterState::Active,
            tx: Some(tx),
            head: Head {
                status: StatusCode::OK,
                headers,
            },
            headers_sent: false,
            binary: false,
        };
        let writer = Self {
            inner: Arc::new(Mutex::new(inner)),
            socket,
        };
        (writer, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transport(&self) -> TransportKind {
        self.lock().kind
    }

    /// Deliver `data`. Fails once the writer has ended.
    pub fn write(&self, data: impl Into<Payload>) -> Result<(), WriteError> {
        let mut inner = self.lock();
        if inner.state == WriterState::Ended {
            return Err(WriteError::Ended);
        }
        inner.flush_head();
        let payload = inner.shape(data.into());
        let sent = inner
            .tx
            .as_ref()
            .map(|tx| tx.send(Command::Data(payload)).is_ok())
            .unwrap_or(false);
        if !sent {
            inner.close();
            return Err(WriteError::Closed);
        }
        if inner.state == WriterState::PendingEnd {
            inner.finish();
        }
        Ok(())
    }

    /// Close the response gracefully. Idempotent.
    pub fn end(&self) {
        self.lock().finish();
    }

    /// Write a final payload, then end.
    pub fn end_with(&self, data: impl Into<Payload>) -> Result<(), WriteError> {
        self.write(data)?;
        self.end();
        Ok(())
    }

    /// End as soon as the next `write` has been delivered.
    pub fn end_after_next_write(&self) {
        let mut inner = self.lock();
        if inner.state == WriterState::Active {
            inner.state = WriterState::PendingEnd;
        }
    }

    /// Abort the transport without a graceful close.
    pub fn destroy(&self) {
        {
            let mut inner = self.lock();
            if let Some(tx) = inner.tx.take() {
                let _ = tx.send(Command::Destroy);
            }
            inner.state = WriterState::Ended;
        }
        self.socket.destroy();
    }

    pub fn is_ended(&self) -> bool {
        self.lock().state == WriterState::Ended
    }

    /// Send text payloads as binary WebSocket frames.
    pub fn set_binary(&self, binary: bool) {
        self.lock().binary = binary;
    }

    /// Set the HTTP status. No-op once headers are sent or off HTTP.
    pub fn set_status(&self, status: StatusCode) {
        let mut inner = self.lock();
        if inner.head_mutable() {
            inner.head.status = status;
        }
    }

    /// Set (replace) an HTTP response header.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        let mut inner = self.lock();
        if inner.head_mutable() {
            inner.head.headers.insert(name, value);
        }
    }

    pub fn remove_header(&self, name: &HeaderName) {
        let mut inner = self.lock();
        if inner.head_mutable() {
            inner.head.headers.remove(name);
        }
    }

    /// Send the HTTP head now with `status`.
    pub fn write_head(&self, status: StatusCode) {
        let mut inner = self.lock();
        if inner.head_mutable() && inner.state != WriterState::Ended {
            inner.head.status = status;
            inner.flush_head();
        }
    }

    pub fn headers_sent(&self) -> bool {
        self.lock().headers_sent
    }

    /// Auto-complete after the request body ended, unless an
    /// end-after-write is still waiting for its write.
    pub(crate) fn auto_end(&self) {
        let mut inner = self.lock();
        if inner.state == WriterState::Active {
            inner.finish();
        }
    }
}

impl Inner {
    fn head_mutable(&self) -> bool {
        self.kind == TransportKind::Http && !self.headers_sent
    }

    fn flush_head(&mut self) {
        if !self.head_mutable() {
            return;
        }
        self.headers_sent = true;
        let head = Box::new(self.head.clone());
        if let Some(tx) = &self.tx {
            let _ = tx.send(Command::Head(head));
        }
    }

    fn shape(&self, payload: Payload) -> Payload {
        match payload {
            Payload::Text(s) if self.binary && self.kind == TransportKind::WebSocket => {
                Payload::Binary(Bytes::from(s))
            }
            other => other,
        }
    }

    fn finish(&mut self) {
        if self.state == WriterState::Ended {
            return;
        }
        self.flush_head();
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Command::End);
        }
        self.state = WriterState::Ended;
    }

    fn close(&mut self) {
        self.tx = None;
        self.state = WriterState::Ended;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> (ResponseWriter, mpsc::UnboundedReceiver<Command>) {
        ResponseWriter::new(TransportKind::Raw, ClientSocket::new(None, None))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Command>) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    fn ends(cmds: &[Command]) -> usize {
        cmds.iter().filter(|c| matches!(c, Command::End)).count()
    }

    #[test]
    fn end_twice_closes_once() {
        let (writer, mut rx) = raw();
        writer.end();
        writer.end();
        assert_eq!(ends(&drain(&mut rx)), 1);
        assert!(writer.is_ended());
    }

    #[test]
    fn write_end_end_closes_once() {
        let (writer, mut rx) = raw();
        writer.write("hi").unwrap();
        writer.end();
        writer.end();
        let cmds = drain(&mut rx);
        assert_eq!(cmds.len(), 2);
        assert!(matches!(&cmds[0], Command::Data(Payload::Text(s)) if s == "hi"));
        assert_eq!(ends(&cmds), 1);
    }

    #[test]
    fn write_after_end_fails() {
        let (writer, _rx) = raw();
        writer.end();
        assert_eq!(writer.write("late"), Err(WriteError::Ended));
        assert_eq!(writer.end_with("late"), Err(WriteError::Ended));
    }

    #[test]
    fn end_after_next_write_waits_for_the_write() {
        let (writer, mut rx) = raw();
        writer.end_after_next_write();
        writer.auto_end();
        assert!(!writer.is_ended());
        writer.write("reply").unwrap();
        assert!(writer.is_ended());
        assert_eq!(ends(&drain(&mut rx)), 1);
    }

    #[test]
    fn direct_end_beats_pending_end() {
        let (writer, mut rx) = raw();
        writer.end_after_next_write();
        writer.end();
        assert_eq!(writer.write("x"), Err(WriteError::Ended));
        assert_eq!(ends(&drain(&mut rx)), 1);
    }

    #[test]
    fn auto_end_is_idempotent_with_explicit_end() {
        let (writer, mut rx) = raw();
        writer.end();
        writer.auto_end();
        assert_eq!(ends(&drain(&mut rx)), 1);
    }

    #[test]
    fn gone_transport_reports_closed() {
        let (writer, rx) = raw();
        drop(rx);
        assert_eq!(writer.write("x"), Err(WriteError::Closed));
        writer.end();
        assert!(writer.is_ended());
    }

    #[test]
    fn destroy_trips_the_socket() {
        let socket = ClientSocket::new(None, None);
        let (writer, mut rx) = ResponseWriter::new(TransportKind::Raw, socket.clone());
        writer.destroy();
        writer.end();
        assert!(socket.is_destroyed());
        let cmds = drain(&mut rx);
        assert_eq!(cmds.len(), 1);
        assert!(matches!(cmds[0], Command::Destroy));
    }

    #[test]
    fn http_head_flushes_before_first_write() {
        let (writer, mut rx) =
            ResponseWriter::new(TransportKind::Http, ClientSocket::new(None, None));
        writer.set_status(StatusCode::CREATED);
        writer.set_header(
            hyper::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        );
        writer.write("body").unwrap();
        assert!(writer.headers_sent());
        // frozen once sent
        writer.set_status(StatusCode::IM_A_TEAPOT);
        writer.end();

        let cmds = drain(&mut rx);
        assert_eq!(cmds.len(), 3);
        match &cmds[0] {
            Command::Head(head) => {
                assert_eq!(head.status, StatusCode::CREATED);
                assert_eq!(head.headers[hyper::header::CACHE_CONTROL], "no-store");
            }
            other => panic!("expected head, got {other:?}"),
        }
        assert!(matches!(cmds[1], Command::Data(_)));
        assert!(matches!(cmds[2], Command::End));
    }

    #[test]
    fn http_end_without_write_still_sends_head() {
        let (writer, mut rx) =
            ResponseWriter::new(TransportKind::Http, ClientSocket::new(None, None));
        writer.end();
        let cmds = drain(&mut rx);
        assert!(matches!(&cmds[0], Command::Head(h) if h.status == StatusCode::OK));
        assert!(matches!(cmds[1], Command::End));
    }

    #[test]
    fn header_accessors_ignored_off_http() {
        let (writer, mut rx) = raw();
        writer.write_head(StatusCode::NOT_FOUND);
        writer.set_status(StatusCode::NOT_FOUND);
        assert!(!writer.headers_sent());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn binary_flag_only_shapes_websocket_text() {
        let (ws, mut rx) =
            ResponseWriter::new(TransportKind::WebSocket, ClientSocket::new(None, None));
        ws.set_binary(true);
        ws.write("frame").unwrap();
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [Command::Data(Payload::Binary(b))] if b.as_ref() == b"frame"
        ));

        let (plain, mut rx) = raw();
        plain.set_binary(true);
        plain.write("line").unwrap();
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [Command::Data(Payload::Text(_))]
        ));
    }
}
