//! Fan-out of server messages to registered connections
//!
//! Delivery is best effort: a send failure on one connection is counted
//! and logged, and never affects delivery to the others. Record-level
//! messages go to every connection, plus a second copy to connections
//! scoped to the affected order.

use crate::event::record_id;
use crate::message::ServerMessage;
use crate::registry::ConnectionRegistry;
use crate::stats::OrderStats;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name reported in degraded-service broadcasts.
const SERVICE_NAME: &str = "order-sync";

/// Fan-out counters.
#[derive(Debug, Default)]
pub struct BroadcastMetrics {
    messages_sent: AtomicU64,
    sends_failed: AtomicU64,
    broadcasts: AtomicU64,
}

impl BroadcastMetrics {
    /// Point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> BroadcastMetricsSnapshot {
        BroadcastMetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`BroadcastMetrics`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BroadcastMetricsSnapshot {
    /// Messages successfully handed to outbound channels
    pub messages_sent: u64,
    /// Sends that failed because the channel was closed
    pub sends_failed: u64,
    /// Broadcast operations performed
    pub broadcasts: u64,
}

/// Delivers server messages to the connection registry.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    metrics: BroadcastMetrics,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            metrics: BroadcastMetrics::default(),
        }
    }

    /// The registry this broadcaster delivers to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Snapshot of the fan-out counters.
    pub fn metrics(&self) -> BroadcastMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Announce a newly created order.
    pub fn announce_created(&self, record: &Value) {
        let msg = ServerMessage::OrderCreated {
            data: record.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.broadcast_record(record, msg);
    }

    /// Announce an updated order with its optional pre-image.
    pub fn announce_updated(&self, current: &Value, previous: Option<&Value>) {
        let msg = ServerMessage::OrderUpdated {
            data: current.clone(),
            previous_data: previous.cloned(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.broadcast_record(current, msg);
    }

    /// Announce a deleted order. `record` is the pre-image or a stub.
    pub fn announce_deleted(&self, record: &Value) {
        let msg = ServerMessage::OrderDeleted {
            data: record.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.broadcast_record(record, msg);
    }

    /// Announce that an order reached the delivered status.
    pub fn announce_delivered(&self, record: &Value) {
        let order_id = match record_id(record) {
            Some(id) => id.to_string(),
            None => {
                warn!("delivered record has no id, skipping milestone broadcast");
                return;
            }
        };
        let string_field = |name: &str| {
            record
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let msg = ServerMessage::OrderDelivered {
            order_id,
            customer_name: string_field("customer_name"),
            product_name: string_field("product_name"),
        };
        self.broadcast_record(record, msg);
    }

    /// Tell every client the pipeline gave up recovering.
    pub fn announce_service_degraded(&self, message: impl Into<String>) {
        let msg = ServerMessage::ServiceError {
            service: SERVICE_NAME.to_string(),
            status: "degraded".to_string(),
            message: message.into(),
        };
        self.send_to_all(&msg);
    }

    /// Broadcast fresh aggregate statistics.
    pub fn broadcast_stats(&self, stats: &OrderStats) {
        let msg = ServerMessage::OrderStats {
            total_orders: stats.total_orders,
            status_breakdown: stats.status_breakdown.clone(),
            timestamp: stats.timestamp.clone(),
        };
        self.send_to_all(&msg);
    }

    /// Broadcast the current connection count.
    pub fn broadcast_client_count(&self) {
        let msg = ServerMessage::ClientCountUpdate {
            connected_clients: self.registry.len(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.send_to_all(&msg);
    }

    /// Send a record-level message to everyone, plus a second copy to
    /// connections scoped to the record's order.
    fn broadcast_record(&self, record: &Value, msg: ServerMessage) {
        self.send_to_all(&msg);
        if let Some(order_id) = record_id(record) {
            self.send_scoped(order_id, &msg);
        }
    }

    fn send_to_all(&self, msg: &ServerMessage) {
        self.metrics.broadcasts.fetch_add(1, Ordering::Relaxed);
        let senders = self.registry.senders_all();
        debug!(kind = msg.kind(), recipients = senders.len(), "broadcasting");
        for (id, sender) in senders {
            self.deliver(id, &sender, msg);
        }
    }

    fn send_scoped(&self, order_id: &str, msg: &ServerMessage) {
        let senders = self.registry.senders_for_order(order_id);
        if senders.is_empty() {
            return;
        }
        debug!(
            kind = msg.kind(),
            order_id,
            recipients = senders.len(),
            "sending scoped copy"
        );
        for (id, sender) in senders {
            self.deliver(id, &sender, msg);
        }
    }

    fn deliver(
        &self,
        id: crate::registry::ConnectionId,
        sender: &tokio::sync::mpsc::UnboundedSender<ServerMessage>,
        msg: &ServerMessage,
    ) {
        if sender.send(msg.clone()).is_ok() {
            self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.sends_failed.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = %id, kind = msg.kind(), "send failed, channel closed");
        }
    }
}
