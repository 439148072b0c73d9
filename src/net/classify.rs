//! Async driver for the classification state machine.
//!
//! Reads opening bytes into a [`Sniffer`] until it resolves, racing the
//! classification idle timer and the connection's kill switch.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{sleep, Instant, Sleep};

use crate::config::Settings;
use crate::error::ClientError;
use crate::events::Events;
use crate::sniff::{Resolution, Sniffer};

const READ_CHUNK: usize = 4096;

/// How classification ended.
#[derive(Debug)]
pub(crate) enum Classified {
    /// The peer left or the connection was destroyed first.
    Closed,
    /// Terminal outcome plus every byte consumed while deciding.
    Resolved { resolution: Resolution, prefix: Bytes },
}

/// Which timeout the armed timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Classify,
    Read,
}

pub(crate) async fn classify_stream<S>(
    stream: &mut S,
    settings: &Settings,
    tls_enabled: bool,
    events: &Events,
) -> Classified
where
    S: AsyncRead + Unpin,
{
    let socket = events.socket().clone();
    let mut sniffer = Sniffer::new(settings.raw_fallback, tls_enabled);
    let mut phase = Phase::Classify;
    let mut timer: Option<Pin<Box<Sleep>>> = Some(Box::pin(sleep(settings.classify_timeout)));
    let mut chunk = BytesMut::with_capacity(READ_CHUNK);

    loop {
        chunk.clear();
        tokio::select! {
            biased;

            _ = socket.destroyed() => return Classified::Closed,

            read = stream.read_buf(&mut chunk) => match read {
                Ok(0) => {
                    tracing::trace!(connection_id = %socket.id(), "EOF before classification");
                    return Classified::Closed;
                }
                Ok(_) => match sniffer.feed(&chunk) {
                    Ok(Some(resolution)) => {
                        return Classified::Resolved {
                            resolution,
                            prefix: sniffer.into_buffer(),
                        };
                    }
                    Ok(None) => {
                        let timeout = match phase {
                            Phase::Classify => Some(settings.classify_timeout),
                            Phase::Read => settings.read_timeout,
                        };
                        rearm(&mut timer, timeout);
                    }
                    Err(e) => {
                        tracing::error!(connection_id = %socket.id(), error = %e, "Sniffer misuse");
                        return Classified::Closed;
                    }
                },
                Err(e) => {
                    events.client_error(ClientError::from_io(e));
                    return Classified::Closed;
                }
            },

            _ = fire(&mut timer) => match phase {
                Phase::Classify => match sniffer.expire() {
                    Ok(Some(resolution)) => {
                        return Classified::Resolved {
                            resolution,
                            prefix: sniffer.into_buffer(),
                        };
                    }
                    Ok(None) => {
                        tracing::trace!(connection_id = %socket.id(), "Classification idle, waiting for read timeout");
                        phase = Phase::Read;
                        rearm(&mut timer, settings.read_timeout);
                    }
                    Err(e) => {
                        tracing::error!(connection_id = %socket.id(), error = %e, "Sniffer misuse");
                        return Classified::Closed;
                    }
                },
                Phase::Read => {
                    events.timeout();
                    if socket.is_destroyed() {
                        return Classified::Closed;
                    }
                    rearm(&mut timer, settings.read_timeout);
                }
            },
        }
    }
}

fn rearm(timer: &mut Option<Pin<Box<Sleep>>>, timeout: Option<Duration>) {
    let Some(timeout) = timeout else {
        *timer = None;
        return;
    };
    match timer {
        Some(armed) => armed.as_mut().reset(Instant::now() + timeout),
        None => *timer = Some(Box::pin(sleep(timeout))),
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(armed) => armed.as_mut().await,
        None => pending().await,
    }
}
