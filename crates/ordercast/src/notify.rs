//! Outbound notification dispatch
//!
//! Notifications are fire-and-forget: each one runs in a detached task
//! and a failure there is logged and counted, never surfaced to the
//! capture loop. Without a configured sender the dispatcher is a no-op.

use crate::source::NotificationSender;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A new order was created
    OrderCreated,
    /// An order's status changed
    StatusChanged,
    /// An order was cancelled (deleted)
    OrderCancelled,
}

impl NotificationKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order_created",
            Self::StatusChanged => "status_changed",
            Self::OrderCancelled => "order_cancelled",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Synchronous outcome of a dispatch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A delivery task was spawned
    Dispatched,
    /// No sender is configured; nothing was attempted
    NotConfigured,
}

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl DispatchStats {
    /// Point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatchStatsSnapshot {
    /// Delivery tasks spawned
    pub dispatched: u64,
    /// Deliveries that completed successfully
    pub sent: u64,
    /// Deliveries that returned an error
    pub failed: u64,
    /// Requests skipped because no sender is configured
    pub skipped: u64,
}

/// Fire-and-forget notification dispatcher.
pub struct NotificationDispatcher {
    sender: Option<Arc<dyn NotificationSender>>,
    stats: Arc<DispatchStats>,
}

impl NotificationDispatcher {
    /// Create a dispatcher backed by a sender.
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            sender: Some(sender),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Create a no-op dispatcher for deployments without notifications.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Whether a sender is configured.
    pub fn is_configured(&self) -> bool {
        self.sender.is_some()
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Notify about a newly created order.
    pub fn notify_created(&self, record: &Value) -> DispatchOutcome {
        self.dispatch(NotificationKind::OrderCreated, record, None)
    }

    /// Notify about an order status change.
    pub fn notify_status_changed(
        &self,
        record: &Value,
        old_status: &str,
        new_status: &str,
    ) -> DispatchOutcome {
        let extra = json!({
            "old_status": old_status,
            "new_status": new_status,
        });
        self.dispatch(NotificationKind::StatusChanged, record, Some(extra))
    }

    /// Notify about a cancelled (deleted) order.
    pub fn notify_cancelled(&self, record: &Value) -> DispatchOutcome {
        self.dispatch(NotificationKind::OrderCancelled, record, None)
    }

    fn dispatch(
        &self,
        kind: NotificationKind,
        record: &Value,
        extra: Option<Value>,
    ) -> DispatchOutcome {
        let Some(sender) = self.sender.clone() else {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(%kind, "no notification sender configured, skipping");
            return DispatchOutcome::NotConfigured;
        };

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        let stats = Arc::clone(&self.stats);
        let record = record.clone();
        tokio::spawn(async move {
            match sender.send(kind, &record, extra.as_ref()).await {
                Ok(()) => {
                    stats.sent.fetch_add(1, Ordering::Relaxed);
                    debug!(%kind, "notification sent");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(%kind, error = %e, "notification delivery failed");
                }
            }
        });
        DispatchOutcome::Dispatched
    }
}
