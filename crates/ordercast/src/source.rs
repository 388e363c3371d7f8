//! Trait seams between the pipeline and its backing services
//!
//! The capture loop only ever talks to these traits, so the change feed,
//! the record store and the notification channel can all be swapped out
//! (and mocked in tests) without touching the pipeline.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// An open subscription to the change feed.
///
/// Yields raw changes in feed order. `Ok(None)` means the feed ended
/// cleanly; errors are classified by [`SyncError::is_retriable`].
///
/// [`SyncError::is_retriable`]: crate::error::SyncError::is_retriable
#[async_trait]
pub trait ChangeStream: Send {
    /// Wait for the next change on the feed.
    async fn next_change(&mut self) -> Result<Option<crate::event::RawChange>>;

    /// Close the subscription and release feed resources.
    async fn close(&mut self) -> Result<()>;
}

/// Factory for change feed subscriptions.
///
/// Reopened on every recovery attempt, so implementations must be cheap
/// to call repeatedly.
#[async_trait]
pub trait ChangeStreamSource: Send + Sync {
    /// Open a fresh subscription to the change feed.
    async fn subscribe(&self) -> Result<Box<dyn ChangeStream>>;
}

/// Read-only view of the order record store.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Resolve once the store is reachable. Called before the feed is
    /// opened so a slow-starting store does not surface as a feed error.
    async fn await_ready(&self) -> Result<()>;

    /// Total number of order records.
    async fn count_all(&self) -> Result<u64>;

    /// Number of order records per status value.
    async fn count_by_status(&self) -> Result<BTreeMap<String, u64>>;
}

/// Outbound notification channel (email, webhook, ...).
///
/// Implementations are called from detached tasks; failures must be
/// reported through `Err`, never by panicking.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver a notification about the given record.
    async fn send(
        &self,
        kind: crate::notify::NotificationKind,
        record: &Value,
        extra: Option<&Value>,
    ) -> Result<()>;
}
