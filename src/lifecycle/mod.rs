//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop stops → in-flight connections drain → exit
//! ```
//!
//! # Design Decisions
//! - Draining is bounded by `timeouts.shutdown_grace_secs`
//! - Connections still open after the grace period are dropped with the runtime

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
