//! Wire messages exchanged with interactive clients
//!
//! Every server-to-client payload is a tagged JSON object whose `type`
//! field names the message; client commands use a `command` tag. The
//! transport itself (websocket, SSE, ...) lives outside this crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Messages pushed from the pipeline to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A new order appeared in the collection
    OrderCreated {
        /// The new record
        data: Value,
        /// RFC 3339 broadcast time
        timestamp: String,
    },

    /// An existing order changed
    OrderUpdated {
        /// The record after the change
        data: Value,
        /// The record before the change, when the feed captured it
        previous_data: Option<Value>,
        /// RFC 3339 broadcast time
        timestamp: String,
    },

    /// An order was removed
    OrderDeleted {
        /// The pre-image, or a minimal stub when none survived
        data: Value,
        /// RFC 3339 broadcast time
        timestamp: String,
    },

    /// An order reached its terminal delivered status
    OrderDelivered {
        /// Identifier of the delivered order
        #[serde(rename = "orderId")]
        order_id: String,
        /// Customer display name, if the record carries one
        customer_name: Option<String>,
        /// Product display name, if the record carries one
        product_name: Option<String>,
    },

    /// Aggregate collection statistics
    OrderStats {
        /// Total number of orders
        total_orders: u64,
        /// Order count per status value
        status_breakdown: BTreeMap<String, u64>,
        /// RFC 3339 collection time
        timestamp: String,
    },

    /// Number of currently connected clients changed
    ClientCountUpdate {
        /// Current registry size
        connected_clients: usize,
        /// RFC 3339 broadcast time
        timestamp: String,
    },

    /// The pipeline degraded and stopped recovering
    ServiceError {
        /// Name of the degraded service
        service: String,
        /// Coarse status label (`degraded`)
        status: String,
        /// Human-readable description
        message: String,
    },

    /// Reply to a ping
    Pong {
        /// RFC 3339 server time
        timestamp: String,
    },

    /// Reply to a connection-info request
    ConnectionInfo {
        /// Connection identifier
        connection_id: String,
        /// RFC 3339 connect time
        connected_at: String,
        /// Orders this connection is scoped to
        subscribed_orders: Vec<String>,
    },

    /// Acknowledgement for an order subscription
    Subscribed {
        /// The order now scoped to this connection
        order_id: String,
    },

    /// Acknowledgement for an order unsubscription
    Unsubscribed {
        /// The order no longer scoped to this connection
        order_id: String,
    },
}

impl ServerMessage {
    /// Wire name of this message, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "order-created",
            Self::OrderUpdated { .. } => "order-updated",
            Self::OrderDeleted { .. } => "order-deleted",
            Self::OrderDelivered { .. } => "order-delivered",
            Self::OrderStats { .. } => "order-stats",
            Self::ClientCountUpdate { .. } => "client-count-update",
            Self::ServiceError { .. } => "service-error",
            Self::Pong { .. } => "pong",
            Self::ConnectionInfo { .. } => "connection-info",
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
        }
    }
}

/// Commands sent by connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Scope this connection to an order
    SubscribeOrder {
        /// Order to subscribe to
        order_id: String,
    },

    /// Remove an order scope from this connection
    UnsubscribeOrder {
        /// Order to unsubscribe from
        order_id: String,
    },

    /// Ask for fresh aggregate statistics
    RequestStats,

    /// Liveness probe
    Ping,

    /// Ask for this connection's metadata
    ConnectionInfo,
}
