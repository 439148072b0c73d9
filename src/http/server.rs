//! HTTP/1.1 adapter.
//!
//! # Responsibilities
//! - Serve one request per connection with hyper (`Connection: close`)
//! - Enforce the origin policy and the POST/PUT-only method set
//! - Frame request bodies into messages
//! - Bridge the application's [`ResponseWriter`] to the response body
//! - Hand WebSocket upgrades to the WebSocket adapter
//!
//! # Data Flow
//! ```text
//! request ──▶ Exchange::respond ──┬─ 400 / 405 / 200 (canned)
//!                                 ├─ 101 ──▶ websocket.rs (after the connection yields)
//!                                 └─ POST/PUT ──▶ body pump ──▶ framer ──▶ on_message
//!                                          writer ──▶ Head ──▶ streaming response
//! ```
//!
//! The connection and the body pump run on one task (`tokio::join!`), so the
//! last message is always delivered before `disconnect`.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use super::response::{self, ResponseBody};
use super::websocket::{self, PendingUpgrade};
use crate::config::Settings;
use crate::dispatch::{Adapter, Handoff};
use crate::error::ClientError;
use crate::events::Events;
use crate::framing::MessageFramer;
use crate::writer::{Command, ResponseWriter, TransportKind};

/// A request body handed to the pump together with its writer.
struct BodyJob {
    body: Incoming,
    writer: ResponseWriter,
}

pub(crate) struct HttpAdapter {
    settings: Arc<Settings>,
}

impl HttpAdapter {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Serve HTTP over any byte stream (cleartext or decrypted TLS).
    pub async fn serve<T>(&self, io: T, events: Events)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (upgrade_tx, mut upgrade_rx) = oneshot::channel();
        let exchange = Arc::new(Exchange {
            settings: Arc::clone(&self.settings),
            events: events.clone(),
            jobs: jobs_tx,
            upgrade: Mutex::new(Some(upgrade_tx)),
        });

        let service = service_fn(move |req| {
            let exchange = Arc::clone(&exchange);
            async move { exchange.respond(req).await }
        });
        let conn = http1::Builder::new()
            .serve_connection(TokioIo::new(io), service)
            .with_upgrades();
        let pump = pump_bodies(jobs_rx, events.clone(), Arc::clone(&self.settings));

        let (served, ()) = tokio::join!(conn, pump);
        match served {
            Err(e) => events.client_error(ClientError::Http(e)),
            Ok(()) => {
                if let Ok(pending) = upgrade_rx.try_recv() {
                    websocket::serve(pending, events.clone(), &self.settings).await;
                }
            }
        }
        events.disconnect();
    }
}

impl<S> Adapter<S> for HttpAdapter
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn attach(&self, handoff: Handoff<S>) {
        self.serve(handoff.stream, handoff.events).await;
    }
}

/// Per-connection request handling state shared with the hyper service.
struct Exchange {
    settings: Arc<Settings>,
    events: Events,
    jobs: mpsc::UnboundedSender<BodyJob>,
    upgrade: Mutex<Option<oneshot::Sender<PendingUpgrade>>>,
}

impl Exchange {
    async fn respond(&self, mut req: Request<Incoming>) -> Result<Response<ResponseBody>, io::Error> {
        let socket = self.events.socket();
        tracing::debug!(
            connection_id = %socket.id(),
            method = %req.method(),
            uri = %req.uri(),
            "HTTP request"
        );

        if websocket::is_upgrade_request(&req) {
            return Ok(self.accept_upgrade(&mut req));
        }

        let origin = req.headers().get(header::ORIGIN);
        // a missing Origin is validated as empty
        let origin_str = origin.map(|v| v.to_str().unwrap_or_default());
        if !self.settings.origin_allowed(origin_str) {
            tracing::debug!(connection_id = %socket.id(), origin = ?origin, "Origin rejected");
            return Ok(response::bad_request());
        }

        let mut headers = response::base_headers();
        if let Some(origin) = origin {
            response::apply_cors(&mut headers, origin, req.headers());
        }

        match *req.method() {
            Method::OPTIONS => {
                return Ok(response::build(StatusCode::OK, headers, response::empty()));
            }
            Method::POST | Method::PUT => {}
            _ => return Ok(response::method_not_allowed(headers)),
        }

        let (writer, mut commands) =
            ResponseWriter::with_head(TransportKind::Http, socket.clone(), headers);
        self.events.connect(&writer);
        let job = BodyJob {
            body: req.into_body(),
            writer,
        };
        if self.jobs.send(job).is_err() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "body pump gone"));
        }

        // the status line waits for the application's first write or end
        loop {
            match commands.recv().await {
                Some(Command::Head(head)) => return Ok(response::streaming(*head, commands)),
                Some(Command::Destroy) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "response destroyed",
                    ));
                }
                Some(_) => {}
                // the pump let go without an end: the connection is going away
                None if self.settings.explicit_end => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "response dropped without end",
                    ));
                }
                None => {
                    return Ok(response::build(
                        StatusCode::OK,
                        response::base_headers(),
                        response::empty(),
                    ));
                }
            }
        }
    }

    fn accept_upgrade(&self, req: &mut Request<Incoming>) -> Response<ResponseBody> {
        let accept = req
            .headers()
            .get(header::SEC_WEBSOCKET_KEY)
            .map(|key| derive_accept_key(key.as_bytes()))
            .and_then(|accept| HeaderValue::from_str(&accept).ok());
        let Some(accept) = accept else {
            return response::bad_request();
        };
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let pending = PendingUpgrade {
            on_upgrade: hyper::upgrade::on(req),
            origin,
        };
        let sender = self
            .upgrade
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let delivered = match sender {
            Some(tx) => tx.send(pending).is_ok(),
            None => false,
        };
        if !delivered {
            return response::bad_request();
        }

        let mut switching = Response::new(response::empty());
        *switching.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = switching.headers_mut();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
        switching
    }
}

/// Frame request bodies into messages, in request order.
///
/// With `explicit_end` the pump keeps each finished writer until the
/// connection goes away, so only the application can complete the response.
async fn pump_bodies(
    mut jobs: mpsc::UnboundedReceiver<BodyJob>,
    events: Events,
    settings: Arc<Settings>,
) {
    let mut held = Vec::new();
    while let Some(BodyJob { mut body, writer }) = jobs.recv().await {
        let mut framer = MessageFramer::new(&settings.framing);
        let complete = loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        deliver(&events, &writer, framer.push(&data));
                    }
                }
                Some(Err(e)) => {
                    if !writer.is_ended() {
                        events.client_error(ClientError::Http(e));
                    }
                    break false;
                }
                None => {
                    deliver(&events, &writer, framer.finish());
                    break true;
                }
            }
        };
        if !complete {
            continue;
        }
        if settings.explicit_end {
            held.push(writer);
        } else {
            tokio::task::yield_now().await;
            writer.auto_end();
        }
    }
}

fn deliver(events: &Events, writer: &ResponseWriter, messages: impl IntoIterator<Item = Bytes>) {
    for message in messages {
        events.message(message, writer);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::events::testing::Recorder;
    use crate::events::Handler;
    use crate::http::origin::OriginPolicy;
    use crate::net::connection::ClientSocket;

    async fn exchange(settings: Settings, request: &[u8]) -> (String, Vec<String>) {
        let recorder = Arc::new(Recorder::default());
        let handler: Arc<dyn Handler> = recorder.clone();
        let events = Events::new(handler, ClientSocket::new(None, None));
        let adapter = HttpAdapter::new(Arc::new(settings));
        let (mut client, server) = duplex(4096);

        let task = tokio::spawn(async move { adapter.serve(server, events).await });
        client.write_all(request).await.unwrap();
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        task.await.unwrap();
        (String::from_utf8_lossy(&out).into_owned(), recorder.entries())
    }

    #[tokio::test]
    async fn get_is_not_allowed() {
        let (response, events) =
            exchange(Settings::default(), b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405"));
        assert!(response.to_ascii_lowercase().contains("allow: post,put"));
        assert!(response.contains("Allowed methods are POST or PUT."));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn post_body_becomes_one_message() {
        let (response, events) = exchange(
            Settings::default(),
            b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 14\r\n\r\n{\"test\":true}\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.to_ascii_lowercase().contains("connection: close"));
        assert_eq!(events, vec!["connect", "message:{\"test\":true}", "disconnect"]);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_end_holds_the_response_open() {
        let recorder = Arc::new(Recorder::default());
        let handler: Arc<dyn Handler> = recorder.clone();
        let events = Events::new(handler, ClientSocket::new(None, None));
        let settings = Settings {
            explicit_end: true,
            ..Settings::default()
        };
        let adapter = HttpAdapter::new(Arc::new(settings));
        let (mut client, server) = duplex(4096);

        let task = tokio::spawn(async move { adapter.serve(server, events).await });
        client
            .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 8\r\n\r\nwaiting\n")
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_secs(60), client.read(&mut buf)).await;
        assert!(read.is_err(), "no response may be sent before the application ends it");
        assert_eq!(recorder.entries(), vec!["connect", "message:waiting"]);
        task.abort();
    }

    #[tokio::test]
    async fn options_preflight_gets_cors() {
        let settings = Settings {
            origin: Some(OriginPolicy::from_pattern("*.example.com")),
            ..Settings::default()
        };
        let (response, events) = exchange(
            settings,
            b"OPTIONS / HTTP/1.1\r\nHost: x\r\nOrigin: http://test.example.com\r\n\r\n",
        )
        .await;
        let lower = response.to_ascii_lowercase();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(lower.contains("access-control-allow-origin: http://test.example.com"));
        assert!(lower.contains("access-control-allow-credentials: true"));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn foreign_origin_is_rejected() {
        let settings = Settings {
            origin: Some(OriginPolicy::from_pattern("*.example.com")),
            ..Settings::default()
        };
        let (response, events) = exchange(
            settings,
            b"POST / HTTP/1.1\r\nHost: x\r\nOrigin: http://fail.com\r\nContent-Length: 3\r\n\r\nhi\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(events.is_empty());
    }
}
