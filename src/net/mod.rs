//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (identity, once-only flags, kill switch)
//!     → activity.rs (idle tracking)
//!     → classify.rs (sniff opening bytes under the idle timer)
//!     → rewind.rs (replay sniffed bytes)
//!     → tls.rs (handshake for sniffed TLS)
//!     → Hand off to an adapter
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is decided per connection by sniffing, not per port

pub mod activity;
pub(crate) mod classify;
pub mod connection;
pub mod listener;
pub mod rewind;
pub mod tls;
