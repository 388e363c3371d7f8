//! Change event model
//!
//! Raw feed payloads are classified into normalized [`ChangeEvent`]s with
//! per-operation shape rules: inserts and updates carry the current record,
//! deletes may only carry the pre-image.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Terminal status that triggers the delivery milestone broadcast.
pub const DELIVERED_STATUS: &str = "delivered";

/// Change operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// New record inserted
    Insert,
    /// Existing record updated in place
    Update,
    /// Record removed
    Delete,
    /// Record replaced wholesale (treated like an update downstream)
    Replace,
}

impl ChangeOp {
    /// Parse a raw feed operation label.
    pub fn parse(op: &str) -> Result<Self> {
        match op {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            other => Err(SyncError::malformed_event(format!(
                "unrecognized operation '{other}'"
            ))),
        }
    }

    /// Get the operation as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw change as delivered by the feed, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChange {
    /// Operation label as reported by the feed
    pub op: String,
    /// Identifier of the affected order
    pub order_id: String,
    /// Full record after the change (absent for deletes)
    #[serde(default)]
    pub current: Option<Value>,
    /// Full record before the change (when the feed provides a pre-image)
    #[serde(default)]
    pub previous: Option<Value>,
    /// Feed timestamp in epoch milliseconds
    pub timestamp: i64,
}

/// A normalized change event, ready for fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Operation type
    pub op: ChangeOp,
    /// Identifier of the affected order
    pub order_id: String,
    /// Full record after the change (None for deletes)
    pub current: Option<Value>,
    /// Full record before the change, when available
    pub previous: Option<Value>,
    /// When the change occurred
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an insert event. Inserts always carry the new record.
    pub fn insert(order_id: impl Into<String>, record: Value) -> Self {
        Self {
            op: ChangeOp::Insert,
            order_id: order_id.into(),
            current: Some(record),
            previous: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an update event with the post-image and optional pre-image.
    pub fn update(order_id: impl Into<String>, current: Value, previous: Option<Value>) -> Self {
        Self {
            op: ChangeOp::Update,
            order_id: order_id.into(),
            current: Some(current),
            previous,
            timestamp: Utc::now(),
        }
    }

    /// Create a delete event. The pre-image is whatever the feed retained.
    pub fn delete(order_id: impl Into<String>, previous: Option<Value>) -> Self {
        Self {
            op: ChangeOp::Delete,
            order_id: order_id.into(),
            current: None,
            previous,
            timestamp: Utc::now(),
        }
    }

    /// Classify a raw feed change into a normalized event.
    ///
    /// Enforces per-operation shape: inserts, updates and replaces must
    /// carry the current record, and every event needs an order id.
    pub fn classify(raw: RawChange) -> Result<Self> {
        if raw.order_id.is_empty() {
            return Err(SyncError::malformed_event("event is missing an order id"));
        }
        let op = ChangeOp::parse(&raw.op)?;
        let timestamp =
            DateTime::<Utc>::from_timestamp_millis(raw.timestamp).unwrap_or_else(Utc::now);

        match op {
            ChangeOp::Insert | ChangeOp::Update | ChangeOp::Replace => {
                if raw.current.is_none() {
                    return Err(SyncError::malformed_event(format!(
                        "{op} event for order {} has no current record",
                        raw.order_id
                    )));
                }
            }
            ChangeOp::Delete => {}
        }

        Ok(Self {
            op,
            order_id: raw.order_id,
            current: raw.current,
            previous: raw.previous,
            timestamp,
        })
    }

    /// Status of the record after this change, if present.
    pub fn status(&self) -> Option<&str> {
        self.current.as_ref().and_then(record_status)
    }

    /// Status of the record before this change, if a pre-image was captured.
    pub fn previous_status(&self) -> Option<&str> {
        self.previous.as_ref().and_then(record_status)
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} order {}", self.op, self.order_id)
    }
}

/// Extract the identifier of a raw record document.
pub fn record_id(record: &Value) -> Option<&str> {
    record.get("_id").and_then(Value::as_str)
}

/// Extract the status field of a record document.
pub fn record_status(record: &Value) -> Option<&str> {
    record.get("status").and_then(Value::as_str)
}

/// Extract the customer contact address, when present and non-empty.
pub fn contact_address(record: &Value) -> Option<&str> {
    record
        .get("customer_email")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Minimal stand-in broadcast for a delete where no pre-image survived.
pub fn deleted_stub(order_id: &str) -> Value {
    json!({
        "_id": order_id,
        "status": "deleted",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(op: &str, current: Option<Value>, previous: Option<Value>) -> RawChange {
        RawChange {
            op: op.to_string(),
            order_id: "ord-1".to_string(),
            current,
            previous,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_op_parse() {
        assert_eq!(ChangeOp::parse("insert").unwrap(), ChangeOp::Insert);
        assert_eq!(ChangeOp::parse("update").unwrap(), ChangeOp::Update);
        assert_eq!(ChangeOp::parse("delete").unwrap(), ChangeOp::Delete);
        assert_eq!(ChangeOp::parse("replace").unwrap(), ChangeOp::Replace);
        assert!(ChangeOp::parse("drop").is_err());
        assert!(ChangeOp::parse("INSERT").is_err());
    }

    #[test]
    fn test_classify_insert() {
        let record = json!({"_id": "ord-1", "status": "pending"});
        let event = ChangeEvent::classify(raw("insert", Some(record.clone()), None)).unwrap();
        assert_eq!(event.op, ChangeOp::Insert);
        assert_eq!(event.order_id, "ord-1");
        assert_eq!(event.current, Some(record));
        assert!(event.previous.is_none());
    }

    #[test]
    fn test_classify_insert_requires_record() {
        let err = ChangeEvent::classify(raw("insert", None, None)).unwrap_err();
        assert!(matches!(err, SyncError::MalformedEvent(_)));
    }

    #[test]
    fn test_classify_update_keeps_both_images() {
        let current = json!({"_id": "ord-1", "status": "shipped"});
        let previous = json!({"_id": "ord-1", "status": "pending"});
        let event =
            ChangeEvent::classify(raw("update", Some(current), Some(previous))).unwrap();
        assert_eq!(event.op, ChangeOp::Update);
        assert_eq!(event.status(), Some("shipped"));
        assert_eq!(event.previous_status(), Some("pending"));
    }

    #[test]
    fn test_classify_replace_requires_record() {
        assert!(ChangeEvent::classify(raw("replace", None, None)).is_err());
        assert!(
            ChangeEvent::classify(raw("replace", Some(json!({"_id": "ord-1"})), None)).is_ok()
        );
    }

    #[test]
    fn test_classify_delete_without_preimage() {
        let event = ChangeEvent::classify(raw("delete", None, None)).unwrap();
        assert_eq!(event.op, ChangeOp::Delete);
        assert!(event.current.is_none());
        assert!(event.previous.is_none());
    }

    #[test]
    fn test_classify_rejects_missing_order_id() {
        let mut r = raw("insert", Some(json!({})), None);
        r.order_id = String::new();
        assert!(ChangeEvent::classify(r).is_err());
    }

    #[test]
    fn test_classify_unknown_op() {
        let err = ChangeEvent::classify(raw("truncate", None, None)).unwrap_err();
        assert!(err.to_string().contains("truncate"));
    }

    #[test]
    fn test_record_accessors() {
        let record = json!({
            "_id": "ord-9",
            "status": "delivered",
            "customer_email": "a@example.com",
        });
        assert_eq!(record_id(&record), Some("ord-9"));
        assert_eq!(record_status(&record), Some("delivered"));
        assert_eq!(contact_address(&record), Some("a@example.com"));

        let empty_contact = json!({"customer_email": ""});
        assert_eq!(contact_address(&empty_contact), None);
        assert_eq!(contact_address(&json!({})), None);
    }

    #[test]
    fn test_deleted_stub_shape() {
        let stub = deleted_stub("ord-3");
        assert_eq!(record_id(&stub), Some("ord-3"));
        assert_eq!(record_status(&stub), Some("deleted"));
    }

    #[test]
    fn test_event_display() {
        let event = ChangeEvent::insert("ord-1", json!({}));
        assert_eq!(event.to_string(), "insert order ord-1");
    }
}
