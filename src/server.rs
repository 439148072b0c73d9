//! Single-port server: accept loop, shutdown and per-connection tasks.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

use crate::config::{ServerConfig, Settings};
use crate::dispatch::Dispatcher;
use crate::events::Handler;
use crate::lifecycle::shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::load_tls_acceptor;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("Failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),
}

/// Multiplexing server. Cheap to clone; clones share handler and settings.
#[derive(Clone)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
}

impl Server {
    pub fn new(settings: Settings, handler: impl Handler) -> Self {
        Self::from_parts(Arc::new(settings), Arc::new(handler), None)
    }

    /// Terminate sniffed TLS with `acceptor`.
    pub fn with_tls(self, acceptor: TlsAcceptor) -> Self {
        let dispatcher = &self.dispatcher;
        Self::from_parts(
            Arc::clone(&dispatcher.settings),
            Arc::clone(&dispatcher.handler),
            Some(acceptor),
        )
    }

    /// Build from a validated config, loading TLS material when configured.
    pub async fn from_config(config: &ServerConfig, handler: impl Handler) -> Result<Self, ServerError> {
        let server = Self::new(Settings::from(config), handler);
        match &config.listener.tls {
            Some(tls) => {
                let acceptor = load_tls_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                    .await
                    .map_err(ServerError::Tls)?;
                Ok(server.with_tls(acceptor))
            }
            None => Ok(server),
        }
    }

    fn from_parts(settings: Arc<Settings>, handler: Arc<dyn Handler>, tls: Option<TlsAcceptor>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher {
                handler,
                settings,
                tls,
            }),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.dispatcher.settings
    }

    pub fn tls_enabled(&self) -> bool {
        self.dispatcher.tls.is_some()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Accept connections until `shutdown_rx` fires, then drain for up to `grace`.
    pub async fn run(
        &self,
        listener: Listener,
        mut shutdown_rx: broadcast::Receiver<()>,
        grace: Duration,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            tls = self.tls_enabled(),
            raw_fallback = self.settings().raw_fallback,
            "Server starting"
        );

        loop {
            tokio::select! {
                _ = shutdown::recv(&mut shutdown_rx) => {
                    tracing::info!("Shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        metrics::record_connection();
                        let guard = self.tracker.track();
                        let local = stream.local_addr().ok();
                        let _ = stream.set_nodelay(true);
                        let server = self.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            let _guard = guard;
                            server.serve_stream(stream, Some(peer), local).await;
                        });
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                },
            }
        }

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, grace_secs = grace.as_secs(), "Draining connections");
            if tokio::time::timeout(grace, self.tracker.wait_idle()).await.is_err() {
                tracing::warn!(
                    remaining = self.tracker.active_count(),
                    "Grace period elapsed with connections still open"
                );
            }
        }
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Classify and serve one already accepted stream.
    ///
    /// Any byte stream works, which makes in-memory pipes usable in tests.
    pub async fn serve_stream<S>(&self, stream: S, peer: Option<SocketAddr>, local: Option<SocketAddr>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.dispatcher.dispatch(stream, peer, local).await;
    }
}
