//! Change capture pipeline
//!
//! Owns the feed subscription and drives the processing loop: classify
//! each raw change, fan out the matching broadcasts and notifications,
//! then refresh aggregate stats. Events are processed strictly in feed
//! order; only the stats refresh runs off the hot path.
//!
//! On feed failure the loop recovers with bounded exponential backoff
//! (see [`RetryPolicy`]) and reports degraded service once the budget
//! is spent.

use crate::broadcast::Broadcaster;
use crate::error::{Result, SyncError};
use crate::event::{contact_address, deleted_stub, ChangeEvent, ChangeOp, DELIVERED_STATUS};
use crate::notify::NotificationDispatcher;
use crate::retry::{RetryController, RetryPolicy};
use crate::source::{ChangeStream, ChangeStreamSource, OrderStore};
use crate::stats::OrderStats;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Not running
    Stopped,
    /// Waiting for the store and opening the feed
    Starting,
    /// Feed open, processing changes
    Watching,
    /// Feed lost, backoff in progress
    Recovering,
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: CaptureState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> CaptureState {
        match self.0.load(Ordering::Relaxed) {
            1 => CaptureState::Starting,
            2 => CaptureState::Watching,
            3 => CaptureState::Recovering,
            _ => CaptureState::Stopped,
        }
    }

    fn set(&self, state: CaptureState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

/// Configuration for the capture pipeline.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    retry: RetryPolicy,
    subscribe_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            subscribe_timeout: Duration::from_secs(30),
        }
    }
}

impl CaptureConfig {
    /// Create a builder with default settings.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::default()
    }

    /// Backoff policy for feed recovery.
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Upper bound on a single subscribe call.
    pub fn subscribe_timeout(&self) -> Duration {
        self.subscribe_timeout
    }
}

/// Builder for [`CaptureConfig`].
#[derive(Debug, Default)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    /// Set the backoff policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the subscribe timeout.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.config.subscribe_timeout = timeout;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<CaptureConfig> {
        if self.config.subscribe_timeout.is_zero() {
            return Err(SyncError::config("subscribe_timeout must be non-zero"));
        }
        Ok(self.config)
    }
}

/// Processing counters for the capture loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureMetricsSnapshot {
    /// Changes classified and fanned out
    pub events_processed: u64,
    /// Malformed changes that were logged and skipped
    pub events_skipped: u64,
}

struct CaptureInner {
    config: CaptureConfig,
    source: Arc<dyn ChangeStreamSource>,
    store: Arc<dyn OrderStore>,
    broadcaster: Arc<Broadcaster>,
    notifier: Arc<NotificationDispatcher>,
    state: StateCell,
    events_processed: AtomicU64,
    events_skipped: AtomicU64,
}

/// Drives change capture from the feed to connected clients.
pub struct ChangeCapture {
    inner: Arc<CaptureInner>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeCapture {
    /// Create a capture pipeline over the given collaborators.
    pub fn new(
        config: CaptureConfig,
        source: Arc<dyn ChangeStreamSource>,
        store: Arc<dyn OrderStore>,
        broadcaster: Arc<Broadcaster>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(CaptureInner {
                config,
                source,
                store,
                broadcaster,
                notifier,
                state: StateCell::new(CaptureState::Stopped),
                events_processed: AtomicU64::new(0),
                events_skipped: AtomicU64::new(0),
            }),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureState {
        self.inner.state.get()
    }

    /// Snapshot of the processing counters.
    pub fn metrics(&self) -> CaptureMetricsSnapshot {
        CaptureMetricsSnapshot {
            events_processed: self.inner.events_processed.load(Ordering::Relaxed),
            events_skipped: self.inner.events_skipped.load(Ordering::Relaxed),
        }
    }

    /// Start watching the change feed.
    ///
    /// Waits for the record store to become reachable, opens the feed
    /// subscription, and spawns the processing loop. A no-op when the
    /// pipeline is already running.
    pub async fn start(&self) -> Result<()> {
        if self.inner.state.get() != CaptureState::Stopped {
            debug!("change capture already running");
            return Ok(());
        }
        self.inner.state.set(CaptureState::Starting);
        info!("waiting for record store");
        if let Err(e) = self.inner.store.await_ready().await {
            self.inner.state.set(CaptureState::Stopped);
            return Err(e);
        }

        let stream = match subscribe(&self.inner).await {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.state.set(CaptureState::Stopped);
                return Err(e);
            }
        };
        self.inner.state.set(CaptureState::Watching);
        info!("change capture watching");

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);
        let inner = Arc::clone(&self.inner);
        *self.task.lock() = Some(tokio::spawn(run_loop(inner, stream, rx)));
        Ok(())
    }

    /// Stop the pipeline, cancelling any pending recovery timer, and
    /// wait for the processing loop to wind down. Safe to call twice.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.state.set(CaptureState::Stopped);
        info!("change capture stopped");
    }
}

async fn subscribe(inner: &CaptureInner) -> Result<Box<dyn ChangeStream>> {
    match tokio::time::timeout(inner.config.subscribe_timeout, inner.source.subscribe()).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::timeout("opening change feed subscription")),
    }
}

async fn run_loop(
    inner: Arc<CaptureInner>,
    mut stream: Box<dyn ChangeStream>,
    mut shutdown: watch::Receiver<bool>,
) {
    let retry = RetryController::new(inner.config.retry);
    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = stream.next_change() => next,
        };
        match next {
            Ok(Some(raw)) => match ChangeEvent::classify(raw) {
                Ok(event) => {
                    handle_event(&inner, event).await;
                    inner.events_processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    inner.events_skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "skipping malformed change");
                }
            },
            Ok(None) => {
                info!("change feed closed");
                if !recover(&inner, &retry, &mut stream, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "change feed error");
                if !recover(&inner, &retry, &mut stream, &mut shutdown).await {
                    break;
                }
            }
        }
    }
    if let Err(e) = stream.close().await {
        debug!(error = %e, "error closing change feed");
    }
    inner.state.set(CaptureState::Stopped);
}

/// Reopen the feed with bounded backoff. Returns false when the loop
/// should exit, either because stop() was requested or because the
/// attempt budget is spent.
async fn recover(
    inner: &Arc<CaptureInner>,
    retry: &RetryController,
    stream: &mut Box<dyn ChangeStream>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    inner.state.set(CaptureState::Recovering);
    if let Err(e) = stream.close().await {
        debug!(error = %e, "error closing dead change feed");
    }
    loop {
        let Some((attempt, delay)) = retry.begin_attempt() else {
            error!(
                attempts = retry.attempts(),
                "recovery attempts exhausted, giving up"
            );
            inner.broadcaster.announce_service_degraded(
                "order synchronization is unavailable after repeated recovery failures",
            );
            return false;
        };
        info!(attempt, delay_secs = delay.as_secs(), "scheduling feed resubscribe");
        if !retry.wait(delay, shutdown).await {
            return false;
        }
        match subscribe(inner).await {
            Ok(new_stream) => {
                *stream = new_stream;
                retry.reset();
                inner.state.set(CaptureState::Watching);
                info!(attempt, "change feed resubscribed");
                return true;
            }
            Err(e) => warn!(attempt, error = %e, "resubscribe failed"),
        }
    }
}

async fn handle_event(inner: &Arc<CaptureInner>, event: ChangeEvent) {
    debug!(%event, "processing change");
    match event.op {
        ChangeOp::Insert => {
            if let Some(record) = &event.current {
                inner.broadcaster.announce_created(record);
                if contact_address(record).is_some() {
                    inner.notifier.notify_created(record);
                }
            }
        }
        ChangeOp::Update | ChangeOp::Replace => {
            if let Some(current) = &event.current {
                inner
                    .broadcaster
                    .announce_updated(current, event.previous.as_ref());
                if let (Some(old), Some(new)) = (event.previous_status(), event.status()) {
                    if old != new {
                        if contact_address(current).is_some() {
                            inner.notifier.notify_status_changed(current, old, new);
                        }
                        if new == DELIVERED_STATUS {
                            inner.broadcaster.announce_delivered(current);
                        }
                    }
                }
            }
        }
        ChangeOp::Delete => {
            let record = event
                .previous
                .clone()
                .unwrap_or_else(|| deleted_stub(&event.order_id));
            inner.broadcaster.announce_deleted(&record);
            if let Some(previous) = &event.previous {
                if contact_address(previous).is_some() {
                    inner.notifier.notify_cancelled(previous);
                }
            }
        }
    }
    refresh_stats(inner);
}

/// Stats recomputation runs off the hot path so a slow store cannot
/// delay the next change.
fn refresh_stats(inner: &Arc<CaptureInner>) {
    let store = Arc::clone(&inner.store);
    let broadcaster = Arc::clone(&inner.broadcaster);
    tokio::spawn(async move {
        match OrderStats::collect(store.as_ref()).await {
            Ok(stats) => broadcaster.broadcast_stats(&stats),
            Err(e) => warn!(error = %e, "stats refresh failed"),
        }
    });
}
