//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection tasks produce:
//!     → logging.rs (structured log events, connection_id on every line)
//!     → metrics.rs (counters and the active connection gauge)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are fire-and-forget; without an installed recorder they are no-ops
//! - Per-connection logs stay at debug/trace, lifecycle at info/warn

pub mod logging;
pub mod metrics;
