//! Per-connection dispatch: classify, then hand the stream to an adapter.
//!
//! # Data Flow
//! ```text
//! accepted stream
//!     → ActivityStream (idle stamps)
//!     → net::classify (sniff under the idle timer)
//!     → Rewind (replay sniffed bytes)
//!     → Adapter::attach
//!         Raw / Pending → raw.rs
//!         Http          → http::server
//!         Tls           → tls.rs → http::server
//!     → disconnect
//! ```

pub(crate) mod raw;
pub(crate) mod tls;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;

use crate::config::Settings;
use crate::events::{Events, Handler};
use crate::http::server::HttpAdapter;
use crate::net::activity::{Activity, ActivityStream};
use crate::net::classify::{classify_stream, Classified};
use crate::net::connection::ClientSocket;
use crate::net::rewind::Rewind;
use crate::observability::metrics;
use crate::sniff::Resolution;

use self::raw::RawAdapter;
use self::tls::TlsAdapter;

/// Stream as seen by adapters: sniffed bytes first, idle-stamped.
pub(crate) type Replayed<S> = Rewind<ActivityStream<S>>;

/// Everything an adapter needs to take over a classified connection.
pub(crate) struct Handoff<S> {
    pub stream: Replayed<S>,
    pub events: Events,
}

/// A protocol engine that can take over a classified stream.
pub(crate) trait Adapter<S> {
    fn attach(&self, handoff: Handoff<S>) -> impl Future<Output = ()> + Send;
}

/// Shared, read-only state behind every connection task.
pub(crate) struct Dispatcher {
    pub handler: Arc<dyn Handler>,
    pub settings: Arc<Settings>,
    pub tls: Option<TlsAcceptor>,
}

impl Dispatcher {
    pub async fn dispatch<S>(&self, stream: S, peer: Option<SocketAddr>, local: Option<SocketAddr>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let socket = ClientSocket::new(peer, local);
        let events = Events::new(Arc::clone(&self.handler), socket.clone());
        let activity = Activity::new();
        let mut stream = ActivityStream::new(stream, activity.clone());

        let (resolution, prefix) =
            match classify_stream(&mut stream, &self.settings, self.tls.is_some(), &events).await {
                Classified::Closed => return,
                Classified::Resolved { resolution, prefix } => (resolution, prefix),
            };

        if let Err(e) = socket.set_resolved(resolution.resolved_type()) {
            tracing::error!(connection_id = %socket.id(), error = %e, "Connection resolved twice");
            return;
        }
        metrics::record_resolved(resolution.resolved_type());
        tracing::debug!(
            connection_id = %socket.id(),
            resolved = %resolution.resolved_type(),
            buffered = prefix.len(),
            "Connection classified"
        );

        let handoff = Handoff {
            stream: Rewind::new(stream, prefix),
            events: events.clone(),
        };
        let read_timeout = self.settings.read_timeout;

        match resolution {
            Resolution::Rejected(err) => {
                events.client_error(err.into());
                if !socket.is_destroyed() {
                    let mut stream = handoff.stream;
                    if let Err(e) = stream.shutdown().await {
                        tracing::trace!(connection_id = %socket.id(), error = %e, "Shutdown after rejection failed");
                    }
                }
            }
            Resolution::Raw | Resolution::Pending => {
                let adapter = RawAdapter::new(self.settings.framing.clone());
                supervise(adapter.attach(handoff), &events, &activity, read_timeout).await;
            }
            Resolution::Http => {
                let adapter = HttpAdapter::new(Arc::clone(&self.settings));
                supervise(adapter.attach(handoff), &events, &activity, read_timeout).await;
            }
            Resolution::Tls => {
                let Some(acceptor) = self.tls.clone() else {
                    return;
                };
                let adapter = TlsAdapter::new(acceptor, HttpAdapter::new(Arc::clone(&self.settings)));
                supervise(adapter.attach(handoff), &events, &activity, read_timeout).await;
            }
        }
        events.disconnect();
    }
}

/// Run an adapter under the read timeout and the kill switch.
///
/// A destroyed connection drops the adapter, and its stream, immediately.
pub(crate) async fn supervise<F>(
    adapter: F,
    events: &Events,
    activity: &Activity,
    read_timeout: Option<Duration>,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(adapter);
    let socket = events.socket().clone();
    loop {
        tokio::select! {
            biased;

            _ = socket.destroyed() => return,
            _ = &mut adapter => return,
            _ = idle(activity, read_timeout) => {
                events.timeout();
                if socket.is_destroyed() {
                    return;
                }
                activity.touch();
            }
        }
    }
}

async fn idle(activity: &Activity, timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => activity.idle(timeout).await,
        None => std::future::pending().await,
    }
}
