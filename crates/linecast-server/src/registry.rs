//! The set of currently connected peers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use linecast_core::ConnectionId;
use linecast_telemetry::metrics::CONNECTIONS_ACTIVE;
use parking_lot::RwLock;
use tracing::debug;

use crate::connection::Connection;

/// Thread-safe registry of live connections.
///
/// The lock is held only for map operations and for cloning the membership
/// into a snapshot; no socket I/O ever happens under it, so a slow peer can
/// never stall `add`, `remove` or a concurrent broadcast.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    /// Mirrors the map size for lock-free reads.
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection. Returns `false` if its id was already present.
    pub fn add(&self, connection: Arc<Connection>) -> bool {
        let mut conns = self.connections.write();
        let id = connection.id().clone();
        if conns.contains_key(&id) {
            return false;
        }
        let _ = conns.insert(id, connection);
        let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
        true
    }

    /// Remove a connection by id. Removing an absent id is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.write().remove(id);
        if removed.is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
        }
        removed
    }

    /// Add a connection and return a guard that removes it when dropped.
    pub fn register(self: &Arc<Self>, connection: Arc<Connection>) -> Registration {
        let id = connection.id().clone();
        if !self.add(connection) {
            debug!(conn_id = %id, "connection already registered");
        }
        Registration {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Point-in-time copy of the membership.
    ///
    /// Mutations after the snapshot returns do not affect it.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Visit every member of a snapshot, outside the lock.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Connection>)) {
        for conn in &self.snapshot() {
            f(conn);
        }
    }

    /// Ids of all current members.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().cloned().collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership guard returned by [`ConnectionRegistry::register`].
///
/// Dropping it removes the connection, on every exit path of the handler.
#[must_use = "dropping the registration removes the connection immediately"]
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Registration {
    /// Id of the registered connection.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linecast_core::Line;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn make_connection() -> (Arc<Connection>, mpsc::Receiver<Line>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Connection::new(
            ConnectionId::new(),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
            CancellationToken::new(),
        );
        (Arc::new(conn), rx)
    }

    #[test]
    fn add_and_remove() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection();
        let id = conn.id().clone();
        assert!(reg.add(conn));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(&id));

        assert!(reg.remove(&id).is_some());
        assert!(reg.is_empty());
        assert!(!reg.contains(&id));
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection();
        assert!(reg.add(conn.clone()));
        assert!(!reg.add(conn));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let reg = ConnectionRegistry::new();
        assert!(reg.remove(&ConnectionId::from("conn_missing")).is_none());
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn registration_removes_on_drop() {
        let reg = Arc::new(ConnectionRegistry::new());
        let (conn, _rx) = make_connection();
        let id = conn.id().clone();
        {
            let guard = reg.register(conn);
            assert_eq!(guard.id(), &id);
            assert!(reg.contains(&id));
        }
        assert!(!reg.contains(&id));
        assert!(reg.is_empty());
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let reg = ConnectionRegistry::new();
        let (a, _ra) = make_connection();
        let (b, _rb) = make_connection();
        let a_id = a.id().clone();
        assert!(reg.add(a));
        assert!(reg.add(b));

        let snap = reg.snapshot();
        let _ = reg.remove(&a_id);
        let (c, _rc) = make_connection();
        assert!(reg.add(c));

        assert_eq!(snap.len(), 2);
        assert!(snap.iter().any(|conn| conn.id() == &a_id));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn for_each_may_mutate_registry() {
        let reg = ConnectionRegistry::new();
        for _ in 0..3 {
            let (conn, _rx) = make_connection();
            assert!(reg.add(conn));
        }
        let mut visited = 0;
        // Visits happen outside the lock, so removing here cannot deadlock.
        reg.for_each(|conn| {
            visited += 1;
            let _ = reg.remove(conn.id());
        });
        assert_eq!(visited, 3);
        assert!(reg.is_empty());
    }

    #[test]
    fn ids_lists_members() {
        let reg = ConnectionRegistry::new();
        let (a, _ra) = make_connection();
        let a_id = a.id().clone();
        assert!(reg.add(a));
        assert_eq!(reg.ids(), vec![a_id]);
    }

    #[test]
    fn concurrent_add_remove_keeps_count_consistent() {
        let reg = Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let (conn, _rx) = make_connection();
                        let id = conn.id().clone();
                        assert!(reg.add(conn));
                        let _ = reg.snapshot();
                        assert!(reg.remove(&id).is_some());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(reg.is_empty());
        assert!(reg.snapshot().is_empty());
    }
}
