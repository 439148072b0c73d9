//! Response construction.
//!
//! # Responsibilities
//! - Headers every response carries (`Connection: close`, `Content-Type`)
//! - CORS headers for approved origins
//! - Canned responses (400, 405, pre-flight 200)
//! - Streaming body fed by a [`ResponseWriter`](crate::ResponseWriter)

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::{Body, Frame};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode};
use tokio::sync::mpsc;

use crate::writer::{Command, Head};

pub(crate) type ResponseBody = BoxBody<Bytes, io::Error>;

pub const METHOD_NOT_ALLOWED_BODY: &str = "Allowed methods are POST or PUT.";
const ALLOWED_METHODS: &str = "POST,PUT";
const CORS_METHODS: &str = "POST, PUT";
const DEFAULT_ALLOWED_HEADERS: &str = "Content-Type";

/// Headers every response starts with.
pub(crate) fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers
}

/// Echo an approved origin back with the allowed methods and credentials.
pub(crate) fn apply_cors(headers: &mut HeaderMap, origin: &HeaderValue, request: &HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    let allow_headers = request
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
}

pub(crate) fn empty() -> ResponseBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

pub(crate) fn full(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into()).map_err(|never| match never {}).boxed()
}

pub(crate) fn build(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

pub(crate) fn bad_request() -> Response<ResponseBody> {
    build(StatusCode::BAD_REQUEST, base_headers(), empty())
}

pub(crate) fn method_not_allowed(mut headers: HeaderMap) -> Response<ResponseBody> {
    headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    build(
        StatusCode::METHOD_NOT_ALLOWED,
        headers,
        full(METHOD_NOT_ALLOWED_BODY),
    )
}

/// Response whose body follows the writer's commands.
pub(crate) fn streaming(head: Head, commands: mpsc::UnboundedReceiver<Command>) -> Response<ResponseBody> {
    build(head.status, head.headers, WriterBody::new(commands).boxed())
}

/// Body streamed from a [`ResponseWriter`](crate::ResponseWriter).
///
/// Ends on the writer's `End`; a `Destroy` fails the body so the engine
/// aborts the connection instead of completing the response.
pub(crate) struct WriterBody {
    commands: mpsc::UnboundedReceiver<Command>,
    done: bool,
}

impl WriterBody {
    pub fn new(commands: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            commands,
            done: false,
        }
    }
}

impl Body for WriterBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }
            match ready!(self.commands.poll_recv(cx)) {
                Some(Command::Data(payload)) => {
                    let data = payload.into_bytes();
                    if !data.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }
                }
                Some(Command::Head(_)) => {}
                Some(Command::End) | None => self.done = true,
                Some(Command::Destroy) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "response destroyed",
                    ))));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ClientSocket;
    use crate::writer::{ResponseWriter, TransportKind};

    #[test]
    fn every_response_closes_as_text() {
        let response = bad_request();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let response = method_not_allowed(base_headers());
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST,PUT");
    }

    #[test]
    fn cors_mirrors_origin_and_requested_headers() {
        let origin = HeaderValue::from_static("http://test.example.com");
        let mut request = HeaderMap::new();
        let mut headers = base_headers();
        apply_cors(&mut headers, &origin, &request);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://test.example.com");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, PUT");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");

        request.insert(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("X-Custom"),
        );
        apply_cors(&mut headers, &origin, &request);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "X-Custom");
    }

    #[tokio::test]
    async fn writer_body_collects_until_end() {
        let (writer, commands) =
            ResponseWriter::new(TransportKind::Raw, ClientSocket::new(None, None));
        writer.write("hello ").unwrap();
        writer.write("").unwrap();
        writer.end_with("world").unwrap();

        let collected = WriterBody::new(commands).collect().await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from("hello world"));
    }

    #[tokio::test]
    async fn destroyed_writer_fails_the_body() {
        let (writer, commands) =
            ResponseWriter::new(TransportKind::Raw, ClientSocket::new(None, None));
        writer.write("partial").unwrap();
        writer.destroy();
        assert!(WriterBody::new(commands).collect().await.is_err());
    }
}
