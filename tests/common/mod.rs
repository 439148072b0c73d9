//! Shared harness: a live server on an ephemeral port with a recording handler.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use portmux::net::listener::Listener;
use portmux::{
    ClientError, ClientSocket, Handler, ResolvedType, ResponseWriter, Server, Settings, Shutdown,
    TransportKind,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

pub const WAIT: Duration = Duration::from_secs(5);

/// One handler callback, as observed by a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect {
        resolved: ResolvedType,
        transport: TransportKind,
    },
    Message(String),
    Disconnect,
    ClientError(&'static str),
    Timeout,
}

/// What the handler answers each message with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Silent,
    /// Write the message back followed by a newline.
    Echo,
    /// Echo, then end the response.
    EchoAndEnd,
}

struct Recording {
    events: mpsc::UnboundedSender<Event>,
    reply: Reply,
}

impl Handler for Recording {
    fn on_connect(&self, writer: &ResponseWriter, socket: &ClientSocket) {
        let _ = self.events.send(Event::Connect {
            resolved: socket.resolved_type(),
            transport: writer.transport(),
        });
    }

    fn on_message(&self, data: Bytes, writer: &ResponseWriter, _socket: &ClientSocket) {
        let text = String::from_utf8_lossy(&data).into_owned();
        let _ = self.events.send(Event::Message(text.clone()));
        match self.reply {
            Reply::Silent => {}
            Reply::Echo => {
                let _ = writer.write(format!("{text}\n"));
            }
            Reply::EchoAndEnd => {
                let _ = writer.end_with(format!("{text}\n"));
            }
        }
    }

    fn on_disconnect(&self, _socket: &ClientSocket) {
        let _ = self.events.send(Event::Disconnect);
    }

    fn on_client_error(&self, error: &ClientError, socket: &ClientSocket) {
        let _ = self.events.send(Event::ClientError(error.code()));
        socket.destroy();
    }

    fn on_timeout(&self, socket: &ClientSocket) {
        let _ = self.events.send(Event::Timeout);
        socket.destroy();
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<Event>,
    shutdown: Shutdown,
}

impl TestServer {
    pub async fn start(settings: Settings, reply: Reply) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let server = Server::new(settings, Recording { events: tx, reply });
        Self::run(server, events).await
    }

    /// Same as [`start`](Self::start), terminating sniffed TLS with `acceptor`.
    pub async fn start_tls(settings: Settings, reply: Reply, acceptor: TlsAcceptor) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let server = Server::new(settings, Recording { events: tx, reply }).with_tls(acceptor);
        Self::run(server, events).await
    }

    async fn run(server: Server, events: mpsc::UnboundedReceiver<Event>) -> Self {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener = Listener::from_tcp(tcp, 64).unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, rx, Duration::from_secs(1)).await;
        });
        Self {
            addr,
            events,
            shutdown,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Next recorded event, failing the test after [`WAIT`].
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Events up to and including the next disconnect.
    pub async fn until_disconnect(&mut self) -> Vec<Event> {
        let mut seen = Vec::new();
        loop {
            let event = self.next().await;
            let done = event == Event::Disconnect;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Messages recorded before the next disconnect.
    pub async fn messages(&mut self) -> Vec<String> {
        self.until_disconnect()
            .await
            .into_iter()
            .filter_map(|event| match event {
                Event::Message(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn assert_quiet(&mut self) {
        assert!(
            self.events.try_recv().is_err(),
            "no further events were expected"
        );
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn message(text: &str) -> Event {
    Event::Message(text.to_owned())
}

/// A client that never uses a proxy and never pools connections.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Split a raw HTTP/1.1 response into its head and decoded body.
pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let at = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8_lossy(&raw[..at]).into_owned();
    let mut rest = &raw[at + 4..];
    if !head.to_ascii_lowercase().contains("transfer-encoding: chunked") {
        return (head, rest.to_vec());
    }

    let mut body = Vec::new();
    loop {
        let eol = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("truncated chunk size");
        let size = std::str::from_utf8(&rest[..eol]).unwrap();
        let size = usize::from_str_radix(size.split(';').next().unwrap().trim(), 16).unwrap();
        rest = &rest[eol + 2..];
        if size == 0 {
            return (head, body);
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}
