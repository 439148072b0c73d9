//! Per-connection identity, flags and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Hold the once-only flags (resolved type, connect, disconnect)
//! - Carry the kill switch every adapter observes
//! - Count in-flight connections for graceful shutdown

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

use crate::sniff::{ResolvedType, SniffError};

/// Global atomic counter for connection IDs.
/// Relaxed ordering: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State shared between the connection task and application handles.
#[derive(Debug)]
pub(crate) struct ConnectionContext {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    resolved: OnceLock<ResolvedType>,
    pub(crate) connect_emitted: AtomicBool,
    pub(crate) disconnect_emitted: AtomicBool,
    kill: watch::Sender<bool>,
}

/// Application handle to one client connection.
///
/// Cheap to clone; every clone refers to the same connection.
#[derive(Debug, Clone)]
pub struct ClientSocket(Arc<ConnectionContext>);

impl ClientSocket {
    pub(crate) fn new(peer_addr: Option<SocketAddr>, local_addr: Option<SocketAddr>) -> Self {
        let (kill, _) = watch::channel(false);
        Self(Arc::new(ConnectionContext {
            id: ConnectionId::new(),
            peer_addr,
            local_addr,
            resolved: OnceLock::new(),
            connect_emitted: AtomicBool::new(false),
            disconnect_emitted: AtomicBool::new(false),
            kill,
        }))
    }

    pub fn id(&self) -> ConnectionId {
        self.0.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.0.peer_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.0.local_addr
    }

    /// Terminal classification, or `Unresolved` while sniffing.
    pub fn resolved_type(&self) -> ResolvedType {
        self.0
            .resolved
            .get()
            .copied()
            .unwrap_or(ResolvedType::Unresolved)
    }

    /// Abort the connection. Pending writes are discarded.
    pub fn destroy(&self) {
        if !self.0.kill.send_replace(true) {
            tracing::debug!(connection_id = %self.0.id, "Connection destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        *self.0.kill.borrow()
    }

    /// Resolves once [`destroy`](Self::destroy) has been called.
    pub(crate) async fn destroyed(&self) {
        let mut rx = self.0.kill.subscribe();
        // the sender lives as long as `self`, so this only errors on a dropped context
        let _ = rx.wait_for(|killed| *killed).await;
    }

    /// Record the terminal classification. A second call is a logic error.
    pub(crate) fn set_resolved(&self, resolved: ResolvedType) -> Result<(), SniffError> {
        self.0
            .resolved
            .set(resolved)
            .map_err(|_| SniffError::AlreadyResolved(self.resolved_type()))
    }

    pub(crate) fn context(&self) -> &ConnectionContext {
        &self.0
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|n| *n += 1);
        crate::observability::metrics::set_active_connections(self.active_count());
        ConnectionGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until every tracked connection has closed.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<u64>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        crate::observability::metrics::set_active_connections(*self.active.borrow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn resolved_type_is_set_once() {
        let socket = ClientSocket::new(None, None);
        assert_eq!(socket.resolved_type(), ResolvedType::Unresolved);
        socket.set_resolved(ResolvedType::Raw).unwrap();
        assert_eq!(
            socket.set_resolved(ResolvedType::Http),
            Err(SniffError::AlreadyResolved(ResolvedType::Raw))
        );
        assert_eq!(socket.resolved_type(), ResolvedType::Raw);
    }

    #[tokio::test]
    async fn destroy_wakes_waiters() {
        let socket = ClientSocket::new(None, None);
        let waiter = {
            let socket = socket.clone();
            tokio::spawn(async move { socket.destroyed().await })
        };
        assert!(!socket.is_destroyed());
        socket.destroy();
        socket.destroy();
        assert!(socket.is_destroyed());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        drop(guard2);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.active_count(), 0);
    }
}
