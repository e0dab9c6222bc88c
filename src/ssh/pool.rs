//! Keyed cache of remote sessions.
//!
//! Sessions are expensive to establish, so they are shared across
//! commands targeting the same host coordinates and routing prefix.
//! Lookup is replace-if-stale: a dead or configuration-drifted entry is
//! swapped for a fresh session atomically per key, and the old session
//! is never torn down while a command is still running on it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::HostIdentity;
use crate::error::Result;
use crate::ports::{PooledSession, SessionConnector};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    hostname: String,
    port: u16,
    user: String,
    routing_prefix: Option<String>,
}

impl PoolKey {
    fn new(identity: &HostIdentity, routing_prefix: Option<&str>) -> Self {
        Self {
            hostname: identity.hostname.clone(),
            port: identity.port,
            user: identity.user.clone(),
            routing_prefix: routing_prefix.map(ToString::to_string),
        }
    }
}

pub struct SessionPool<C: SessionConnector> {
    connector: C,
    sessions: Mutex<HashMap<PoolKey, Arc<C::Session>>>,
    pinned: Mutex<HashSet<PoolKey>>,
    idle_timeout: Duration,
}

impl<C: SessionConnector> SessionPool<C> {
    pub fn new(connector: C, idle_timeout: Duration) -> Self {
        Self {
            connector,
            sessions: Mutex::new(HashMap::new()),
            pinned: Mutex::new(HashSet::new()),
            idle_timeout,
        }
    }

    /// Returns the pooled session for these coordinates, creating or
    /// replacing it when missing, disconnected, or stale. The map lock
    /// is held across creation so two callers cannot race a duplicate
    /// session for the same key.
    pub async fn get(
        &self,
        system_id: &str,
        identity: &HostIdentity,
        routing_prefix: Option<&str>,
    ) -> Result<Arc<C::Session>> {
        let key = PoolKey::new(identity, routing_prefix);
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(&key) {
            if existing.is_same(identity) && existing.is_connected().await {
                debug!(system = %system_id, host = %identity.hostname, "reusing pooled session");
                existing.touch();
                return Ok(Arc::clone(existing));
            }

            // Stale or dead: replace. A busy old session keeps running
            // until its caller finishes; it is just no longer pooled.
            let old = sessions.remove(&key);
            if let Some(old) = old {
                if old.is_busy() {
                    warn!(
                        system = %system_id,
                        host = %identity.hostname,
                        "replacing stale session, old one left running while busy"
                    );
                } else if let Err(e) = old.disconnect().await {
                    debug!(host = %identity.hostname, error = %e, "stale session disconnect failed");
                }
            }
        }

        info!(system = %system_id, host = %identity.hostname, "creating session");
        let session = Arc::new(
            self.connector
                .connect(system_id, identity, routing_prefix)
                .await?,
        );
        sessions.insert(key, Arc::clone(&session));
        Ok(session)
    }

    /// Marks these coordinates always-on: exempt from idle eviction
    /// until unpinned.
    pub async fn pin(&self, identity: &HostIdentity, routing_prefix: Option<&str>) {
        self.pinned
            .lock()
            .await
            .insert(PoolKey::new(identity, routing_prefix));
    }

    pub async fn unpin(&self, identity: &HostIdentity, routing_prefix: Option<&str>) {
        self.pinned
            .lock()
            .await
            .remove(&PoolKey::new(identity, routing_prefix));
    }

    /// Drops every pooled session and clears pins. Busy sessions are
    /// removed from the pool but not disconnected.
    pub async fn reset_all(&self) {
        let mut sessions = self.sessions.lock().await;
        self.pinned.lock().await.clear();

        for (key, session) in sessions.drain() {
            if session.is_busy() {
                warn!(host = %key.hostname, "reset: session busy, dropped from pool without disconnect");
                continue;
            }
            if let Err(e) = session.disconnect().await {
                debug!(host = %key.hostname, error = %e, "reset: disconnect failed");
            }
        }
    }

    /// Evicts sessions idle beyond the configured window. Pinned and
    /// busy sessions survive the sweep.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let pinned = self.pinned.lock().await;

        let expired: Vec<PoolKey> = sessions
            .iter()
            .filter(|(key, session)| {
                !pinned.contains(key)
                    && !session.is_busy()
                    && session.idle_for() >= self.idle_timeout
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            if let Some(session) = sessions.remove(&key) {
                info!(host = %key.hostname, "evicting idle session");
                if let Err(e) = session.disconnect().await {
                    debug!(host = %key.hostname, error = %e, "idle eviction disconnect failed");
                }
                evicted += 1;
            }
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::ports::connector::mock::MockConnector;

    fn identity(key_path: &str) -> HostIdentity {
        HostIdentity {
            hostname: "app01.lab".to_string(),
            port: 22,
            user: "tester".to_string(),
            auth: AuthConfig::Key {
                path: key_path.to_string(),
                passphrase: None,
            },
            max_channels: 5,
            connect_timeout_seconds: 20,
            connect_attempts: 3,
            keepalive_interval_seconds: 30,
            request_pty: false,
        }
    }

    fn pool() -> SessionPool<MockConnector> {
        let connector = MockConnector::new();
        connector.add_system("app");
        SessionPool::new(connector, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_get_reuses_unchanged_identity() {
        let pool = pool();
        let id = identity("~/.ssh/id_ed25519");

        let first = pool.get("app", &id, None).await.unwrap();
        let second = pool.get("app", &id, None).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_get_replaces_on_key_path_drift() {
        let pool = pool();
        let id = identity("~/.ssh/id_ed25519");

        let first = pool.get("app", &id, None).await.unwrap();
        first.set_busy(true);

        let drifted = identity("~/.ssh/id_rsa_new");
        let second = pool.get("app", &drifted, None).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(pool.connector.connect_count(), 2);
        // Old session was busy: left untouched.
        assert!(!first.was_disconnected());
        assert!(first.is_connected().await);
    }

    #[tokio::test]
    async fn test_get_replaces_dead_session() {
        let pool = pool();
        let id = identity("~/.ssh/id_ed25519");

        let first = pool.get("app", &id, None).await.unwrap();
        first.set_connected(false);

        let second = pool.get("app", &id, None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(pool.connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_routing_prefix_distinguishes_sessions() {
        let pool = pool();
        let id = identity("~/.ssh/id_ed25519");

        let direct = pool.get("app", &id, None).await.unwrap();
        let routed = pool.get("app", &id, Some("ssh hop01")).await.unwrap();

        assert!(!Arc::ptr_eq(&direct, &routed));
        assert_eq!(pool.len().await, 2);
        let calls = pool.connector.connect_calls();
        assert_eq!(calls[1].routing_prefix.as_deref(), Some("ssh hop01"));
    }

    #[tokio::test]
    async fn test_reset_all_skips_busy() {
        let pool = pool();
        let id = identity("~/.ssh/id_ed25519");

        let idle = pool.get("app", &id, None).await.unwrap();
        let busy = pool.get("app", &id, Some("hop")).await.unwrap();
        busy.set_busy(true);

        pool.reset_all().await;

        assert!(pool.is_empty().await);
        assert!(idle.was_disconnected());
        assert!(!busy.was_disconnected());
    }

    #[tokio::test]
    async fn test_evict_idle_respects_pins_and_busy() {
        let connector = MockConnector::new();
        connector.add_system("app");
        let pool = SessionPool::new(connector, Duration::from_secs(60));
        let id = identity("~/.ssh/id_ed25519");

        let expired = pool.get("app", &id, None).await.unwrap();
        let pinned = pool.get("app", &id, Some("pinned")).await.unwrap();
        let busy = pool.get("app", &id, Some("busy")).await.unwrap();

        pool.pin(&id, Some("pinned")).await;
        busy.set_busy(true);

        expired.backdate(Duration::from_secs(120));
        pinned.backdate(Duration::from_secs(120));
        busy.backdate(Duration::from_secs(120));

        let evicted = pool.evict_idle().await;
        assert_eq!(evicted, 1);
        assert!(expired.was_disconnected());
        assert!(!pinned.was_disconnected());
        assert!(!busy.was_disconnected());
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_unpin_makes_session_evictable() {
        let connector = MockConnector::new();
        connector.add_system("app");
        let pool = SessionPool::new(connector, Duration::from_secs(60));
        let id = identity("~/.ssh/id_ed25519");

        let session = pool.get("app", &id, None).await.unwrap();
        pool.pin(&id, None).await;
        session.backdate(Duration::from_secs(120));

        assert_eq!(pool.evict_idle().await, 0);
        pool.unpin(&id, None).await;
        assert_eq!(pool.evict_idle().await, 1);
    }

    #[tokio::test]
    async fn test_connect_error_propagates() {
        let connector = MockConnector::new();
        connector.add_system_error("broken", "connection refused");
        let pool = SessionPool::new(connector, Duration::from_secs(600));

        let err = pool
            .get("broken", &identity("~/.ssh/id_ed25519"), None)
            .await
            .unwrap_err();
        assert!(format!("{err}").contains("refused"));
        assert!(pool.is_empty().await);
    }
}
