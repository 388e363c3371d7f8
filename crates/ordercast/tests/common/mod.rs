//! Shared fakes and helpers for pipeline integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ordercast::{
    ChangeStream, ChangeStreamSource, NotificationKind, NotificationSender, OrderStore, RawChange,
    Result, ServerMessage, SyncError,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ordercast=debug")
        .with_test_writer()
        .try_init();
}

/// One step a scripted change feed takes.
pub enum FeedStep {
    /// Yield a raw change
    Change(RawChange),
    /// Yield a feed error
    Error(&'static str),
    /// End the feed cleanly
    Close,
}

/// Feed stream that replays scripted steps, then idles forever.
pub struct ScriptedStream {
    steps: VecDeque<FeedStep>,
}

#[async_trait]
impl ChangeStream for ScriptedStream {
    async fn next_change(&mut self) -> Result<Option<RawChange>> {
        match self.steps.pop_front() {
            Some(FeedStep::Change(change)) => Ok(Some(change)),
            Some(FeedStep::Error(msg)) => Err(SyncError::feed(msg)),
            Some(FeedStep::Close) => Ok(None),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source that hands out one scripted stream per subscribe call and
/// refuses once the script runs dry. Records when each call happened.
pub struct ScriptedSource {
    streams: Mutex<VecDeque<Vec<FeedStep>>>,
    subscribe_times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedSource {
    pub fn new(streams: Vec<Vec<FeedStep>>) -> Self {
        Self {
            streams: Mutex::new(streams.into_iter().collect()),
            subscribe_times: Mutex::new(Vec::new()),
        }
    }

    /// Instants at which subscribe was called, in order.
    pub fn subscribe_times(&self) -> Vec<tokio::time::Instant> {
        self.subscribe_times.lock().clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_times.lock().len()
    }
}

#[async_trait]
impl ChangeStreamSource for ScriptedSource {
    async fn subscribe(&self) -> Result<Box<dyn ChangeStream>> {
        self.subscribe_times.lock().push(tokio::time::Instant::now());
        match self.streams.lock().pop_front() {
            Some(steps) => Ok(Box::new(ScriptedStream {
                steps: steps.into_iter().collect(),
            })),
            None => Err(SyncError::feed("subscribe refused")),
        }
    }
}

/// Store with fixed counts, always ready.
#[derive(Default)]
pub struct FakeStore {
    pub total: u64,
    pub breakdown: BTreeMap<String, u64>,
}

#[async_trait]
impl OrderStore for FakeStore {
    async fn await_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn count_all(&self) -> Result<u64> {
        Ok(self.total)
    }

    async fn count_by_status(&self) -> Result<BTreeMap<String, u64>> {
        Ok(self.breakdown.clone())
    }
}

/// Notification sender that records every delivery request.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<(NotificationKind, Value, Option<Value>)>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<(NotificationKind, Value, Option<Value>)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: false }, rx)
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(
        &self,
        kind: NotificationKind,
        record: &Value,
        extra: Option<&Value>,
    ) -> Result<()> {
        let _ = self.tx.send((kind, record.clone(), extra.cloned()));
        if self.fail {
            Err(SyncError::notification("delivery refused"))
        } else {
            Ok(())
        }
    }
}

pub fn raw(op: &str, order_id: &str, current: Option<Value>, previous: Option<Value>) -> RawChange {
    RawChange {
        op: op.to_string(),
        order_id: order_id.to_string(),
        current,
        previous,
        timestamp: 1_700_000_000_000,
    }
}

/// Wait for the next record-level message, skipping the stats and
/// client-count chatter that interleaves with it.
pub async fn next_record_message(
    rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("message channel closed");
        match msg.kind() {
            "order-stats" | "client-count-update" => continue,
            _ => return msg,
        }
    }
}

/// Wait for the next notification delivery request.
pub async fn next_notification(
    rx: &mut mpsc::UnboundedReceiver<(NotificationKind, Value, Option<Value>)>,
) -> (NotificationKind, Value, Option<Value>) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}
