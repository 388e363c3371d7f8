//! Client command handling
//!
//! Validates and executes inbound commands against the registry and the
//! record store, producing the reply message for the requesting
//! connection. Every command counts as client activity.

use crate::broadcast::Broadcaster;
use crate::error::Result;
use crate::message::{ClientCommand, ServerMessage};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::source::OrderStore;
use crate::stats::OrderStats;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Executes client commands and manages connection lifecycle.
pub struct CommandHandler {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    store: Arc<dyn OrderStore>,
}

impl CommandHandler {
    /// Create a handler over the given collaborators.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            store,
        }
    }

    /// Register a new client connection and tell everyone the count
    /// changed.
    pub fn connect(&self, outbound: mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let id = self.registry.register(outbound);
        self.broadcaster.broadcast_client_count();
        id
    }

    /// Remove a client connection and tell everyone the count changed.
    pub fn disconnect(&self, id: ConnectionId) {
        if self.registry.unregister(id) {
            self.broadcaster.broadcast_client_count();
        }
    }

    /// Execute one command on behalf of a connection.
    ///
    /// Fails with [`SyncError::UnknownConnection`] when the connection is
    /// not registered; the transport decides how to surface that.
    ///
    /// [`SyncError::UnknownConnection`]: crate::error::SyncError::UnknownConnection
    pub async fn handle(
        &self,
        id: ConnectionId,
        command: ClientCommand,
    ) -> Result<ServerMessage> {
        debug!(connection_id = %id, ?command, "handling command");
        match command {
            ClientCommand::SubscribeOrder { order_id } => {
                self.registry.subscribe(id, &order_id)?;
                Ok(ServerMessage::Subscribed { order_id })
            }
            ClientCommand::UnsubscribeOrder { order_id } => {
                self.registry.unsubscribe(id, &order_id)?;
                Ok(ServerMessage::Unsubscribed { order_id })
            }
            ClientCommand::Ping => {
                self.registry.touch(id)?;
                Ok(ServerMessage::Pong {
                    timestamp: Utc::now().to_rfc3339(),
                })
            }
            ClientCommand::RequestStats => {
                self.registry.touch(id)?;
                let stats = OrderStats::collect(self.store.as_ref()).await?;
                Ok(ServerMessage::OrderStats {
                    total_orders: stats.total_orders,
                    status_breakdown: stats.status_breakdown,
                    timestamp: stats.timestamp,
                })
            }
            ClientCommand::ConnectionInfo => {
                self.registry.touch(id)?;
                let details = self.registry.details(id)?;
                Ok(ServerMessage::ConnectionInfo {
                    connection_id: details.id.to_string(),
                    connected_at: details.connected_at.to_rfc3339(),
                    subscribed_orders: details.subscribed_orders,
                })
            }
        }
    }
}
