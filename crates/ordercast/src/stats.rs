//! Aggregate order statistics
//!
//! Recomputed from the record store after every processed change and on
//! explicit client request, then broadcast to all connections.

use crate::error::Result;
use crate::source::OrderStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate view of the order collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStats {
    /// Total number of orders
    pub total_orders: u64,
    /// Order count per status value
    pub status_breakdown: BTreeMap<String, u64>,
    /// RFC 3339 collection time
    pub timestamp: String,
}

impl OrderStats {
    /// Collect fresh statistics from the store.
    pub async fn collect(store: &dyn OrderStore) -> Result<Self> {
        let total_orders = store.count_all().await?;
        let status_breakdown = store.count_by_status().await?;
        Ok(Self {
            total_orders,
            status_breakdown,
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}
