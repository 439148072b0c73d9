//! Single-port protocol multiplexer.
//!
//! Every accepted connection is sniffed and served as HTTP/1.1, TLS (then
//! HTTP), WebSocket, or raw delimited messages. Applications see one
//! [`Handler`] and one [`ResponseWriter`] whatever the transport.

pub mod config;
pub(crate) mod dispatch;
pub mod error;
pub mod events;
pub mod framing;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;
pub mod sniff;
pub mod writer;

pub use config::{ServerConfig, Settings};
pub use error::{ClassifyError, ClientError};
pub use events::Handler;
pub use framing::{FramingConfig, MessageFramer};
pub use lifecycle::Shutdown;
pub use net::connection::{ClientSocket, ConnectionId};
pub use server::{Server, ServerError};
pub use sniff::ResolvedType;
pub use writer::{Payload, ResponseWriter, TransportKind, WriteError};
