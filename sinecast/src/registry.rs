//! The set of connected observers.
//!
//! The broadcaster iterates over [`ClientRegistry::snapshot`] copies, so a
//! slow send never holds the lock and a concurrent registration or removal
//! never invalidates an iteration in progress. Removals are batched and
//! applied after the iteration completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mio::net::TcpStream;
use parking_lot::Mutex;

use crate::net::{Connection, ConnectionId, Endpoint};

/// Registered connections in registration order.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<Vec<Arc<Connection>>>,
    next_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds an accepted stream under a fresh id and returns the shared handle.
    pub fn register(&self, stream: TcpStream, peer: Endpoint) -> Arc<Connection> {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let conn = Arc::new(Connection::new(id, stream, peer));
        self.clients.lock().push(Arc::clone(&conn));
        conn
    }

    /// Removes a connection. Removing an absent id is a no-op returning `None`.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut clients = self.clients.lock();
        let pos = clients.iter().position(|c| c.id() == id)?;
        Some(clients.remove(pos))
    }

    /// Removes every listed connection that is still present.
    ///
    /// Returns the handles actually removed by this call.
    pub fn unregister_all(&self, ids: &[ConnectionId]) -> Vec<Arc<Connection>> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut clients = self.clients.lock();
        let mut removed = Vec::with_capacity(ids.len());
        clients.retain(|c| {
            if ids.contains(&c.id()) {
                removed.push(Arc::clone(c));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Returns a point-in-time copy of the registered connections.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.clients.lock().clone()
    }

    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.lock().iter().any(|c| c.id() == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Removes and returns every connection.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        std::mem::take(&mut *self.clients.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::tests::stream_pair;

    #[test]
    fn register_then_unregister_restores_size() {
        let registry = ClientRegistry::new();
        let (stream, peer, _c1) = stream_pair();
        registry.register(stream, peer);
        let before = registry.len();

        let (stream, peer, _c2) = stream_pair();
        let conn = registry.register(stream, peer);
        assert_eq!(registry.len(), before + 1);

        assert!(registry.unregister(conn.id()).is_some());
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ClientRegistry::new();
        let (stream, peer, _client) = stream_pair();
        let conn = registry.register(stream, peer);

        assert!(registry.unregister(conn.id()).is_some());
        assert!(registry.unregister(conn.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_are_unique_and_snapshot_is_ordered() {
        let registry = ClientRegistry::new();
        let mut peers = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let (stream, peer, client) = stream_pair();
            ids.push(registry.register(stream, peer).id());
            peers.push(client);
        }

        registry.unregister(ids[1]);
        let (stream, peer, _late) = stream_pair();
        let late = registry.register(stream, peer).id();
        assert!(!ids.contains(&late));

        let order: Vec<_> = registry.snapshot().iter().map(|c| c.id()).collect();
        assert_eq!(order, vec![ids[0], ids[2], ids[3], late]);
    }

    #[test]
    fn snapshot_survives_concurrent_removal() {
        let registry = ClientRegistry::new();
        let (stream, peer, _client) = stream_pair();
        let conn = registry.register(stream, peer);

        let snapshot = registry.snapshot();
        registry.unregister(conn.id());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), conn.id());
        assert!(!registry.contains(conn.id()));
    }

    #[test]
    fn unregister_all_skips_missing() {
        let registry = ClientRegistry::new();
        let mut keep = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (stream, peer, client) = stream_pair();
            ids.push(registry.register(stream, peer).id());
            keep.push(client);
        }
        registry.unregister(ids[0]);

        let removed = registry.unregister_all(&[ids[0], ids[2]]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), ids[2]);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(ids[1]));
    }

    #[test]
    fn drain_empties_registry() {
        let registry = ClientRegistry::new();
        let (stream, peer, _client) = stream_pair();
        registry.register(stream, peer);
        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
    }
}
