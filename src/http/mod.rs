//! HTTP and WebSocket transports.
//!
//! # Data Flow
//! ```text
//! classified HTTP stream (cleartext or decrypted TLS)
//!     → server.rs (hyper connection, one request, body framing)
//!     → origin.rs (allow-list check)
//!     → response.rs (canned responses, CORS, writer-fed body)
//!     → websocket.rs (after a 101 upgrade)
//! ```

pub mod origin;
pub(crate) mod response;
pub(crate) mod server;
pub(crate) mod websocket;

pub use origin::OriginPolicy;
pub use response::METHOD_NOT_ALLOWED_BODY;
