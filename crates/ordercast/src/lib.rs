//! # ordercast - Order change capture and fan-out
//!
//! Keeps interactive clients synchronized with an order collection:
//! watches the collection's change feed, classifies each mutation,
//! broadcasts the result to every registered connection (plus a scoped
//! second copy to order subscribers), refreshes aggregate statistics,
//! and fires best-effort customer notifications.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐      ┌───────────────┐      ┌───────────────┐
//! │ Change feed │─────▶│ ChangeCapture │─────▶│  Broadcaster  │
//! │(ChangeStream│      │ classify /    │      │ all + scoped  │
//! │   Source)   │      │ retry / stats │      │   fan-out     │
//! └─────────────┘      └──────┬────────┘      └──────┬────────┘
//!                             │                      │
//!                             ▼                      ▼
//!                   ┌──────────────────┐   ┌──────────────────┐
//!                   │ Notification     │   │ Connection       │
//!                   │ Dispatcher       │   │ Registry         │
//!                   │ (fire-and-forget)│   │ (per-order subs) │
//!                   └──────────────────┘   └──────────────────┘
//! ```
//!
//! Events are processed strictly in feed order. A lost feed is reopened
//! with bounded exponential backoff (5s, 10s, 20s, 40s, 80s by default);
//! once the budget is spent the pipeline broadcasts a single
//! degraded-service message and stops.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example(
//! #     source: std::sync::Arc<dyn ordercast::ChangeStreamSource>,
//! #     store: std::sync::Arc<dyn ordercast::OrderStore>,
//! # ) -> ordercast::Result<()> {
//! use ordercast::{
//!     Broadcaster, CaptureConfig, ChangeCapture, ConnectionRegistry,
//!     NotificationDispatcher,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry)));
//! let capture = ChangeCapture::new(
//!     CaptureConfig::default(),
//!     source,
//!     store,
//!     broadcaster,
//!     Arc::new(NotificationDispatcher::disabled()),
//! );
//! capture.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod capture;
pub mod commands;
pub mod error;
pub mod event;
pub mod message;
pub mod notify;
pub mod registry;
pub mod retry;
pub mod source;
pub mod stats;

// Core types
pub use broadcast::{BroadcastMetricsSnapshot, Broadcaster};
pub use capture::{
    CaptureConfig, CaptureConfigBuilder, CaptureMetricsSnapshot, CaptureState, ChangeCapture,
};
pub use error::{ErrorCategory, Result, SyncError};
pub use event::{ChangeEvent, ChangeOp, RawChange};

// Client-facing surface
pub use commands::CommandHandler;
pub use message::{ClientCommand, ServerMessage};
pub use registry::{ConnectionId, ConnectionRegistry, RegistrySnapshot};

// Collaborator seams and supporting types
pub use notify::{DispatchOutcome, DispatchStatsSnapshot, NotificationDispatcher, NotificationKind};
pub use retry::{RetryController, RetryPolicy};
pub use source::{ChangeStream, ChangeStreamSource, NotificationSender, OrderStore};
pub use stats::OrderStats;
