//! Connection Registry
//!
//! Tracks every live streaming connection by subscriber so that a
//! subscriber's streams can be cancelled in bulk.
//!
//! # Design
//!
//! The registry tracks:
//! - Which connections each subscriber has open
//! - The cancellation token owned by each connection's session
//!
//! Its mutex is private to the registry and is never held while calling
//! into the content store, and tokens are cancelled only after the lock is
//! released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Types
// =============================================================================

/// Subscriber identity (the caller's credential).
pub type SubscriberId = String;

/// Unique identifier for a streaming connection.
pub type ConnectionId = String;

/// A registered streaming connection.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Connection ID.
    pub id: ConnectionId,
    /// Owning subscriber.
    pub subscriber_id: SubscriberId,
    /// Cancels the connection's delivery loop.
    pub cancel: CancellationToken,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

// =============================================================================
// Registration Handle
// =============================================================================

/// Handle returned by [`ConnectionRegistry::register`].
///
/// Dropping the handle unregisters the connection, so every exit path of a
/// delivery loop (including panics) leaves the registry consistent.
#[derive(Debug)]
pub struct Registration {
    connection_id: ConnectionId,
    subscriber_id: SubscriberId,
    registry: Arc<ConnectionRegistry>,
    active: bool,
}

impl Registration {
    /// The allocated connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// The owning subscriber.
    #[must_use]
    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Unregister now. Returns `true` if the connection was still registered.
    pub fn unregister(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.registry
            .unregister(&self.subscriber_id, &self.connection_id)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Process-wide table of live connections, keyed by subscriber.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use filtered_stream::domain::connection::ConnectionRegistry;
/// use tokio_util::sync::CancellationToken;
///
/// let registry = Arc::new(ConnectionRegistry::new());
/// let token = CancellationToken::new();
///
/// let registration = registry.register("alice", token.clone());
/// assert_eq!(registry.connection_count("alice"), 1);
///
/// assert_eq!(registry.close_all("alice"), 1);
/// assert!(token.is_cancelled());
/// assert_eq!(registry.connection_count("alice"), 0);
///
/// // Already removed by close_all.
/// assert!(!registration.unregister());
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    subscribers: Mutex<HashMap<SubscriberId, HashMap<ConnectionId, Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's cancellation token under a subscriber.
    pub fn register(self: &Arc<Self>, subscriber_id: &str, cancel: CancellationToken) -> Registration {
        let connection = Connection {
            id: uuid::Uuid::new_v4().to_string(),
            subscriber_id: subscriber_id.to_string(),
            cancel,
            registered_at: Utc::now(),
        };
        let connection_id = connection.id.clone();

        self.subscribers
            .lock()
            .entry(subscriber_id.to_string())
            .or_default()
            .insert(connection_id.clone(), connection);

        tracing::debug!(subscriber_id, connection_id = %connection_id, "Connection registered");

        Registration {
            connection_id,
            subscriber_id: subscriber_id.to_string(),
            registry: Arc::clone(self),
            active: true,
        }
    }

    /// Remove a connection. Drops the subscriber's bucket once it is empty.
    ///
    /// Returns `true` if the connection was registered.
    pub fn unregister(&self, subscriber_id: &str, connection_id: &str) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(bucket) = subscribers.get_mut(subscriber_id) else {
            return false;
        };

        let removed = bucket.remove(connection_id).is_some();
        if bucket.is_empty() {
            subscribers.remove(subscriber_id);
        }

        if removed {
            tracing::debug!(subscriber_id, connection_id, "Connection unregistered");
        }
        removed
    }

    /// Cancel and remove every connection of a subscriber.
    ///
    /// Returns the number of connections cancelled (0 if none existed).
    pub fn close_all(&self, subscriber_id: &str) -> usize {
        let bucket = self.subscribers.lock().remove(subscriber_id);
        let Some(bucket) = bucket else {
            return 0;
        };

        for connection in bucket.values() {
            connection.cancel.cancel();
        }

        tracing::info!(subscriber_id, count = bucket.len(), "Closed all connections");
        bucket.len()
    }

    /// Check whether a specific connection is registered.
    #[must_use]
    pub fn is_registered(&self, subscriber_id: &str, connection_id: &str) -> bool {
        self.subscribers
            .lock()
            .get(subscriber_id)
            .is_some_and(|b| b.contains_key(connection_id))
    }

    /// Number of live connections for a subscriber.
    #[must_use]
    pub fn connection_count(&self, subscriber_id: &str) -> usize {
        self.subscribers
            .lock()
            .get(subscriber_id)
            .map_or(0, HashMap::len)
    }

    /// Number of live connections across all subscribers.
    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.stats().connection_count
    }

    /// Snapshot of a subscriber's connections.
    #[must_use]
    pub fn connections(&self, subscriber_id: &str) -> Vec<Connection> {
        self.subscribers
            .lock()
            .get(subscriber_id)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Overall statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let subscribers = self.subscribers.lock();
        RegistryStats {
            subscriber_count: subscribers.len(),
            connection_count: subscribers.values().map(HashMap::len).sum(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Subscribers with at least one connection.
    pub subscriber_count: usize,
    /// Live connections across all subscribers.
    pub connection_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
