//! In-memory binding of authenticated users to their live connections.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use super::connection::ConnectionHandle;

#[derive(Default)]
struct SessionMaps {
    // Forward map for routing, back-reference for O(1) unbind on close.
    // The two are mutated together under the same lock.
    by_user: HashMap<i64, ConnectionHandle>,
    by_connection: HashMap<u64, i64>,
}

/// Registry of user-to-connection sessions.
///
/// At most one live connection is bound per user id at any instant; a
/// later `bind` for the same user silently replaces the prior mapping
/// without notifying the displaced connection. Entries have no TTL and
/// are removed only by `unbind` when their connection closes.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<SessionMaps>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `user_id` to `handle`, replacing any existing binding.
    ///
    /// Idempotent upsert: re-binding the same pair is a no-op, and a
    /// connection that re-authenticates as a different user keeps only
    /// its latest binding.
    pub async fn bind(&self, user_id: i64, handle: ConnectionHandle) {
        let mut maps = self.inner.lock().await;

        if let Some(displaced) = maps.by_user.insert(user_id, handle.clone()) {
            maps.by_connection.remove(&displaced.id());
            debug!(
                user_id,
                displaced_connection = displaced.id(),
                "session binding replaced"
            );
        }

        if let Some(previous_user) = maps.by_connection.insert(handle.id(), user_id)
            && previous_user != user_id
        {
            maps.by_user.remove(&previous_user);
        }

        metrics::gauge!("realtime_sessions").set(map_len_f64(&maps));
    }

    /// Looks up the live connection for `user_id`, if any.
    pub async fn resolve(&self, user_id: i64) -> Option<ConnectionHandle> {
        self.inner.lock().await.by_user.get(&user_id).cloned()
    }

    /// Removes the binding held by `handle`, if it ever authenticated.
    ///
    /// Returns the user id that was unbound. No-op for connections that
    /// closed before authenticating.
    pub async fn unbind(&self, handle: &ConnectionHandle) -> Option<i64> {
        let mut maps = self.inner.lock().await;
        let user_id = maps.by_connection.remove(&handle.id())?;

        // Only drop the forward entry if it still points at this
        // connection; a newer binding for the same user must survive.
        if maps
            .by_user
            .get(&user_id)
            .is_some_and(|bound| bound.id() == handle.id())
        {
            maps.by_user.remove(&user_id);
        }

        metrics::gauge!("realtime_sessions").set(map_len_f64(&maps));
        debug!(user_id, connection_id = handle.id(), "session unbound");
        Some(user_id)
    }

    /// Number of currently bound sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_user.len()
    }

    /// Whether no sessions are bound.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.by_user.is_empty()
    }
}

#[allow(clippy::cast_precision_loss)]
fn map_len_f64(maps: &SessionMaps) -> f64 {
    maps.by_user.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::ConnectionManager;

    async fn connect(manager: &ConnectionManager) -> ConnectionHandle {
        let (handle, _rx) = manager.accept(None).await;
        handle
    }

    #[tokio::test]
    async fn bind_then_resolve_returns_the_connection() {
        let manager = ConnectionManager::new(8);
        let registry = SessionRegistry::new();
        let conn = connect(&manager).await;

        registry.bind(1, conn.clone()).await;
        let resolved = registry.resolve(1).await.expect("session bound");
        assert_eq!(resolved.id(), conn.id());
        assert_eq!(registry.resolve(2).await.map(|c| c.id()), None);
    }

    #[tokio::test]
    async fn rebind_replaces_prior_connection_silently() {
        let manager = ConnectionManager::new(8);
        let registry = SessionRegistry::new();
        let first = connect(&manager).await;
        let second = connect(&manager).await;

        registry.bind(1, first.clone()).await;
        registry.bind(1, second.clone()).await;

        let resolved = registry.resolve(1).await.expect("session bound");
        assert_eq!(resolved.id(), second.id());
        assert_eq!(registry.len().await, 1);

        // The displaced connection no longer owns a binding, so its
        // close must not disturb the new one.
        assert_eq!(registry.unbind(&first).await, None);
        assert!(registry.resolve(1).await.is_some());
    }

    #[tokio::test]
    async fn unbind_removes_both_directions() {
        let manager = ConnectionManager::new(8);
        let registry = SessionRegistry::new();
        let conn = connect(&manager).await;

        registry.bind(7, conn.clone()).await;
        assert_eq!(registry.unbind(&conn).await, Some(7));
        assert!(registry.resolve(7).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn unbind_before_authentication_is_a_noop() {
        let manager = ConnectionManager::new(8);
        let registry = SessionRegistry::new();
        let conn = connect(&manager).await;

        assert_eq!(registry.unbind(&conn).await, None);
    }

    #[tokio::test]
    async fn reauthentication_as_different_user_keeps_latest_binding() {
        let manager = ConnectionManager::new(8);
        let registry = SessionRegistry::new();
        let conn = connect(&manager).await;

        registry.bind(1, conn.clone()).await;
        registry.bind(2, conn.clone()).await;

        assert!(registry.resolve(1).await.is_none());
        assert_eq!(registry.resolve(2).await.map(|c| c.id()), Some(conn.id()));
        assert_eq!(registry.len().await, 1);
    }
}
