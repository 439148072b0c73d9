//! TLS termination for sniffed ClientHello streams.
//!
//! The replayed ClientHello feeds the handshake; the decrypted stream is
//! served by the HTTP adapter exactly like a cleartext one.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;

use super::{Adapter, Handoff};
use crate::error::ClientError;
use crate::http::server::HttpAdapter;

pub(crate) struct TlsAdapter {
    acceptor: TlsAcceptor,
    http: HttpAdapter,
}

impl TlsAdapter {
    pub fn new(acceptor: TlsAcceptor, http: HttpAdapter) -> Self {
        Self { acceptor, http }
    }
}

impl<S> Adapter<S> for TlsAdapter
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn attach(&self, handoff: Handoff<S>) {
        let Handoff { stream, events } = handoff;
        match self.acceptor.accept(stream).await {
            Ok(tls) => {
                tracing::trace!(connection_id = %events.socket().id(), "TLS handshake complete");
                self.http.serve(tls, events).await;
            }
            Err(e) => events.client_error(ClientError::TlsHandshake(e)),
        }
    }
}
