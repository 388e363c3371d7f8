//! Connection registry
//!
//! Tracks every connected client, its outbound channel, and the set of
//! orders it is scoped to. All operations take a short lock; message
//! sends happen outside the lock on senders cloned out of it.

use crate::error::{Result, SyncError};
use crate::message::ServerMessage;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Identifier assigned to each client connection.
pub type ConnectionId = Uuid;

/// A registered client connection.
#[derive(Debug)]
pub struct ClientConnection {
    /// Connection identifier
    pub id: ConnectionId,
    /// When the connection registered
    pub connected_at: DateTime<Utc>,
    /// Last time the client showed activity
    pub last_activity: DateTime<Utc>,
    /// Orders this connection is scoped to
    pub subscribed_orders: HashSet<String>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

/// Point-in-time view of one connection, safe to serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDetails {
    /// Connection identifier
    pub id: ConnectionId,
    /// When the connection registered
    pub connected_at: DateTime<Utc>,
    /// Last time the client showed activity
    pub last_activity: DateTime<Utc>,
    /// Orders this connection is scoped to, sorted
    pub subscribed_orders: Vec<String>,
}

/// Consistent snapshot of the whole registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Number of registered connections
    pub total_connections: usize,
    /// Per-connection details
    pub connections: Vec<ConnectionDetails>,
}

/// Registry of connected clients.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ClientConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its identifier.
    pub fn register(&self, outbound: mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let conn = ClientConnection {
            id,
            connected_at: now,
            last_activity: now,
            subscribed_orders: HashSet::new(),
            outbound,
        };
        self.connections.write().insert(id, conn);
        debug!(connection_id = %id, "client registered");
        id
    }

    /// Remove a connection. Returns false if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, "client unregistered");
        }
        removed
    }

    /// Scope a connection to an order. Idempotent; returns true if the
    /// subscription was newly added.
    pub fn subscribe(&self, id: ConnectionId, order_id: &str) -> Result<bool> {
        let mut guard = self.connections.write();
        let conn = guard
            .get_mut(&id)
            .ok_or_else(|| SyncError::unknown_connection(id.to_string()))?;
        conn.last_activity = Utc::now();
        Ok(conn.subscribed_orders.insert(order_id.to_string()))
    }

    /// Remove an order scope from a connection. Idempotent; returns true
    /// if the subscription existed.
    pub fn unsubscribe(&self, id: ConnectionId, order_id: &str) -> Result<bool> {
        let mut guard = self.connections.write();
        let conn = guard
            .get_mut(&id)
            .ok_or_else(|| SyncError::unknown_connection(id.to_string()))?;
        conn.last_activity = Utc::now();
        Ok(conn.subscribed_orders.remove(order_id))
    }

    /// Refresh a connection's liveness timestamp.
    pub fn touch(&self, id: ConnectionId) -> Result<()> {
        let mut guard = self.connections.write();
        let conn = guard
            .get_mut(&id)
            .ok_or_else(|| SyncError::unknown_connection(id.to_string()))?;
        conn.last_activity = Utc::now();
        Ok(())
    }

    /// Whether a connection is currently registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Details for one connection.
    pub fn details(&self, id: ConnectionId) -> Result<ConnectionDetails> {
        let guard = self.connections.read();
        let conn = guard
            .get(&id)
            .ok_or_else(|| SyncError::unknown_connection(id.to_string()))?;
        Ok(details_of(conn))
    }

    /// Consistent snapshot of every connection, taken under one lock.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let guard = self.connections.read();
        let mut connections: Vec<ConnectionDetails> = guard.values().map(details_of).collect();
        connections.sort_by_key(|c| c.connected_at);
        RegistrySnapshot {
            total_connections: connections.len(),
            connections,
        }
    }

    /// Clone out every outbound sender.
    pub(crate) fn senders_all(
        &self,
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<ServerMessage>)> {
        self.connections
            .read()
            .values()
            .map(|c| (c.id, c.outbound.clone()))
            .collect()
    }

    /// Clone out the senders of connections scoped to an order.
    pub(crate) fn senders_for_order(
        &self,
        order_id: &str,
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<ServerMessage>)> {
        self.connections
            .read()
            .values()
            .filter(|c| c.subscribed_orders.contains(order_id))
            .map(|c| (c.id, c.outbound.clone()))
            .collect()
    }
}

fn details_of(conn: &ClientConnection) -> ConnectionDetails {
    let mut subscribed_orders: Vec<String> =
        conn.subscribed_orders.iter().cloned().collect();
    subscribed_orders.sort();
    ConnectionDetails {
        id: conn.id,
        connected_at: conn.connected_at,
        last_activity: conn.last_activity,
        subscribed_orders,
    }
}
