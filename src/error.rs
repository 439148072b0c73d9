//! Connection-level error taxonomy.
//!
//! Every error that reaches [`Handler::on_client_error`](crate::Handler::on_client_error)
//! carries a stable, machine-readable code so embedders can log or count it
//! without matching on display strings.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Why a connection could not be handed to any adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// No signature matched and raw fallback is disabled.
    #[error("no protocol signature matched")]
    UnknownProtocol,
    /// TLS record layer with a handshake type other than ClientHello.
    #[error("TLS record does not carry a ClientHello")]
    TlsInvalidHandshake,
    /// A ClientHello arrived but the listener has no certificate.
    #[error("TLS is not configured on this listener")]
    TlsUnavailable,
    /// Legacy SSLv2 ClientHello.
    #[error("SSLv2 handshakes are not supported")]
    Sslv2Unsupported,
    /// Known bogus client signature shaped like an SSLv2 record.
    #[error("rejected SSLv2-shaped record")]
    Sslv2Invalid,
}

impl ClassifyError {
    pub fn code(&self) -> &'static str {
        match self {
            ClassifyError::UnknownProtocol => "unknown-protocol",
            ClassifyError::TlsInvalidHandshake => "tls-invalid-handshake",
            ClassifyError::TlsUnavailable => "tls-unavailable",
            ClassifyError::Sslv2Unsupported => "sslv2-unsupported",
            ClassifyError::Sslv2Invalid => "sslv2-invalid",
        }
    }
}

/// Error surfaced to the application for a single client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The opening bytes were rejected during classification.
    #[error("parse error: {0}")]
    Classify(#[from] ClassifyError),
    /// Peer went away abruptly.
    #[error("connection reset by peer: {0}")]
    TransportReset(#[source] io::Error),
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl ClientError {
    /// Map a socket error, splitting abrupt peer closes from other I/O failures.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ClientError::TransportReset(err),
            _ => ClientError::Io(err),
        }
    }

    /// Stable code for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Classify(e) => e.code(),
            ClientError::TransportReset(_) => "transport-reset",
            ClientError::TlsHandshake(_) => "tls-handshake",
            ClientError::Http(_) => "http",
            ClientError::WebSocket(_) => "websocket",
            ClientError::Io(_) => "io",
        }
    }

    /// True when the error came from classification rather than a live transport.
    pub fn is_classification(&self) -> bool {
        matches!(self, ClientError::Classify(_))
    }
}
