//! Raw delimited-message transport.
//!
//! Also carries `Pending` connections: the bytes seen before the idle timer
//! fired are framed like any other raw input.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Adapter, Handoff};
use crate::error::ClientError;
use crate::framing::{FramingConfig, MessageFramer};
use crate::writer::{Command, ResponseWriter, TransportKind};

const READ_CHUNK: usize = 8192;

pub(crate) struct RawAdapter {
    framing: FramingConfig,
}

impl RawAdapter {
    pub fn new(framing: FramingConfig) -> Self {
        Self { framing }
    }
}

impl<S> Adapter<S> for RawAdapter
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn attach(&self, handoff: Handoff<S>) {
        let Handoff { mut stream, events } = handoff;
        let (writer, mut commands) =
            ResponseWriter::new(TransportKind::Raw, events.socket().clone());
        if !events.connect(&writer) {
            return;
        }

        let mut framer = MessageFramer::new(&self.framing);
        let prefix = stream.take_prefix();
        for message in framer.push(&prefix) {
            events.message(message, &writer);
        }

        let (mut rd, mut wr) = tokio::io::split(stream);
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut reading = true;
        let mut writing = true;

        while reading || writing {
            tokio::select! {
                read = rd.read_buf(&mut buf), if reading => match read {
                    Ok(0) => {
                        reading = false;
                        for message in framer.finish() {
                            events.message(message, &writer);
                        }
                        // let the handler answer the last message first
                        tokio::task::yield_now().await;
                        writer.end();
                    }
                    Ok(_) => {
                        let chunk = buf.split();
                        for message in framer.push(&chunk) {
                            events.message(message, &writer);
                        }
                    }
                    Err(e) => {
                        events.client_error(ClientError::from_io(e));
                        break;
                    }
                },
                command = commands.recv(), if writing => match command {
                    Some(Command::Data(payload)) => {
                        let data = payload.into_bytes();
                        let written = async {
                            wr.write_all(&data).await?;
                            wr.flush().await
                        };
                        if let Err(e) = written.await {
                            events.client_error(ClientError::from_io(e));
                            break;
                        }
                    }
                    Some(Command::End) | None => {
                        writing = false;
                        if let Err(e) = wr.shutdown().await {
                            tracing::trace!(connection_id = %events.socket().id(), error = %e, "Half-close failed");
                        }
                    }
                    Some(Command::Destroy) => break,
                    Some(Command::Head(_)) => {}
                },
            }
        }
        events.disconnect();
    }
}
