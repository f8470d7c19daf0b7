//! Presence registry: which peers are online and where they listen.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use tokio::sync::Mutex;
use uuid::Uuid;

/// Identifies one tracker connection.
///
/// A session remembers the connection that created it, so that the late
/// disconnect of an old connection cannot remove the session a newer login
/// put in its place.
pub type ConnectionId = Uuid;

/// An online peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSession {
    /// Catalog user id
    pub peer_id: u64,
    /// Address of the peer listener
    pub ip: IpAddr,
    /// Port of the peer listener
    pub port: u16,
    /// Tracker connection that owns this session
    pub connection: ConnectionId,
}

impl PeerSession {
    /// Socket address of the peer listener.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// Live map of `peer_id → PeerSession`.
///
/// All operations take the same lock, so concurrent logins, logouts and
/// snapshots are serialized. At most one session exists per peer id.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    sessions: Mutex<HashMap<u64, PeerSession>>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session of `peer_id`. Last writer wins.
    ///
    /// Returns the session that was replaced, if any.
    pub async fn register(
        &self,
        peer_id: u64,
        ip: IpAddr,
        port: u16,
        connection: ConnectionId,
    ) -> Option<PeerSession> {
        let session = PeerSession {
            peer_id,
            ip,
            port,
            connection,
        };
        let previous = self.sessions.lock().await.insert(peer_id, session);
        if let Some(prev) = &previous {
            tracing::debug!(
                "Peer {} re-registered, replacing {}:{}",
                peer_id,
                prev.ip,
                prev.port
            );
        }
        previous
    }

    /// Remove the session of `peer_id` if it is owned by `connection`.
    ///
    /// Returns whether a session was removed.
    pub async fn deregister(&self, peer_id: u64, connection: ConnectionId) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&peer_id) {
            Some(session) if session.connection == connection => {
                sessions.remove(&peer_id);
                true
            }
            _ => false,
        }
    }

    /// Look up a single session.
    pub async fn get(&self, peer_id: u64) -> Option<PeerSession> {
        self.sessions.lock().await.get(&peer_id).cloned()
    }

    /// Consistent copy of every session, ordered by peer id.
    pub async fn snapshot(&self) -> Vec<PeerSession> {
        let mut sessions: Vec<PeerSession> =
            self.sessions.lock().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.peer_id);
        sessions
    }

    /// Number of online peers.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether nobody is online.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn test_register_and_snapshot() {
        let registry = PresenceRegistry::new();
        assert!(registry.is_empty().await);

        registry.register(2, ip(2), 6002, Uuid::new_v4()).await;
        registry.register(1, ip(1), 6001, Uuid::new_v4()).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].peer_id, 1);
        assert_eq!(snapshot[1].addr(), "10.0.0.2:6002".parse().unwrap());
    }

    #[tokio::test]
    async fn test_relogin_overwrites() {
        let registry = PresenceRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(registry.register(1, ip(1), 6001, first).await.is_none());
        let replaced = registry.register(1, ip(9), 7000, second).await;

        assert_eq!(replaced.map(|s| s.connection), Some(first));
        assert_eq!(registry.len().await, 1);
        let session = registry.get(1).await.expect("session");
        assert_eq!(session.ip, ip(9));
        assert_eq!(session.port, 7000);
    }

    #[tokio::test]
    async fn test_stale_connection_cannot_deregister() {
        let registry = PresenceRegistry::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();

        registry.register(1, ip(1), 6001, old).await;
        registry.register(1, ip(1), 6002, new).await;

        assert!(!registry.deregister(1, old).await);
        assert_eq!(registry.get(1).await.map(|s| s.port), Some(6002));

        assert!(registry.deregister(1, new).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_registrations() {
        let registry = Arc::new(PresenceRegistry::new());
        let mut handles = Vec::new();

        for peer_id in 0..50u64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .register(peer_id % 10, ip(1), 6000, Uuid::new_v4())
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len().await, 10);
    }
}
