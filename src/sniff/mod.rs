//! Protocol sniffing.
//!
//! # Data Flow
//! ```text
//! chunk from socket
//!     → Sniffer::feed (append to the classification buffer)
//!     → skip leading CR/LF/SP
//!     → http::classify → tls::classify → sslv2::classify
//!     → Resolution (or wait for more bytes)
//! ```
//!
//! # Design Decisions
//! - Classifiers are pure functions over `(buffer, offset)`
//! - The buffer is never capped here; the framer bounds memory after handoff
//! - A connection resolves exactly once; feeding a resolved sniffer is an error

pub mod http;
pub mod sslv2;
pub mod tls;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::error::ClassifyError;

/// Result of one classifier over the current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
    InsufficientData,
    /// Positively recognised, but a rejected instance of the protocol.
    Invalid,
}

/// Classification state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedType {
    Unresolved,
    Http,
    Tls,
    Raw,
    Pending,
    Error,
}

impl ResolvedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedType::Unresolved => "unresolved",
            ResolvedType::Http => "http",
            ResolvedType::Tls => "tls",
            ResolvedType::Raw => "raw",
            ResolvedType::Pending => "pending",
            ResolvedType::Error => "error",
        }
    }
}

impl std::fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Http,
    Tls,
    Raw,
    /// No bytes decided the protocol before the idle timer fired.
    Pending,
    Rejected(ClassifyError),
}

impl Resolution {
    pub fn resolved_type(&self) -> ResolvedType {
        match self {
            Resolution::Http => ResolvedType::Http,
            Resolution::Tls => ResolvedType::Tls,
            Resolution::Raw => ResolvedType::Raw,
            Resolution::Pending => ResolvedType::Pending,
            Resolution::Rejected(_) => ResolvedType::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SniffError {
    /// Classification ran on a connection that had already resolved.
    #[error("connection already resolved as {0}")]
    AlreadyResolved(ResolvedType),
}

/// Index of the first byte that is not CR, LF or space.
pub fn skip_whitespace(buf: &[u8]) -> usize {
    buf.iter()
        .position(|b| !matches!(b, b'\r' | b'\n' | b' '))
        .unwrap_or(buf.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signature {
    Http,
    Tls,
    Sslv2,
}

impl Signature {
    fn invalid(self) -> ClassifyError {
        match self {
            Signature::Tls => ClassifyError::TlsInvalidHandshake,
            Signature::Sslv2 => ClassifyError::Sslv2Invalid,
            Signature::Http => ClassifyError::UnknownProtocol,
        }
    }
}

/// Run every classifier over `buf` in priority order.
///
/// Returns `None` while more bytes are needed to decide.
pub fn classify(buf: &[u8], raw_fallback: bool, tls_enabled: bool) -> Option<Resolution> {
    let offset = skip_whitespace(buf);
    if offset == buf.len() {
        return None;
    }

    let verdicts = [
        (Signature::Http, http::classify(buf, offset)),
        (Signature::Tls, tls::classify(buf, offset)),
        (Signature::Sslv2, sslv2::classify(buf, offset)),
    ];

    if let Some((sig, _)) = verdicts.iter().find(|(_, v)| *v == Verdict::Invalid) {
        return Some(Resolution::Rejected(sig.invalid()));
    }
    if let Some((sig, _)) = verdicts.iter().find(|(_, v)| *v == Verdict::Match) {
        return Some(match sig {
            Signature::Http => Resolution::Http,
            Signature::Tls if tls_enabled => Resolution::Tls,
            Signature::Tls => Resolution::Rejected(ClassifyError::TlsUnavailable),
            Signature::Sslv2 => Resolution::Rejected(ClassifyError::Sslv2Unsupported),
        });
    }
    if verdicts.iter().any(|(_, v)| *v == Verdict::InsufficientData) {
        return None;
    }

    Some(if raw_fallback {
        Resolution::Raw
    } else {
        Resolution::Rejected(ClassifyError::UnknownProtocol)
    })
}

/// Classification state machine for one connection.
///
/// Owns the accumulated opening bytes until the connection resolves; the
/// buffer is then handed back whole for replay.
#[derive(Debug)]
pub struct Sniffer {
    buffer: BytesMut,
    state: ResolvedType,
    raw_fallback: bool,
    tls_enabled: bool,
}

impl Sniffer {
    pub fn new(raw_fallback: bool, tls_enabled: bool) -> Self {
        Self {
            buffer: BytesMut::new(),
            state: ResolvedType::Unresolved,
            raw_fallback,
            tls_enabled,
        }
    }

    /// Append a chunk and classify the whole buffer again.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Resolution>, SniffError> {
        self.ensure_unresolved()?;
        self.buffer.extend_from_slice(chunk);
        let resolution = classify(&self.buffer, self.raw_fallback, self.tls_enabled);
        if let Some(resolution) = resolution {
            self.state = resolution.resolved_type();
        }
        Ok(resolution)
    }

    /// The idle timer fired before any signature decided.
    ///
    /// With raw fallback the connection is handed over as `Pending`;
    /// otherwise `None` and the caller escalates to the read timeout.
    pub fn expire(&mut self) -> Result<Option<Resolution>, SniffError> {
        self.ensure_unresolved()?;
        if !self.raw_fallback {
            return Ok(None);
        }
        self.state = ResolvedType::Pending;
        Ok(Some(Resolution::Pending))
    }

    pub fn state(&self) -> ResolvedType {
        self.state
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Surrender the classification buffer for replay.
    pub fn into_buffer(self) -> Bytes {
        self.buffer.freeze()
    }

    fn ensure_unresolved(&self) -> Result<(), SniffError> {
        match self.state {
            ResolvedType::Unresolved => Ok(()),
            other => Err(SniffError::AlreadyResolved(other)),
        }
    }
}
