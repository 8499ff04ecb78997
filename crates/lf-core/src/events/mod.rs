//! Row-change event feed.
//!
//! Every committed write batch publishes one [`ChangeEvent`] per written row.
//! Subscribers receive events only after the batch is durable and are
//! expected to re-fetch the row rather than trust a payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{mpsc, Mutex};

/// Persistent tables that emit change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Escalations,
    Reports,
    RcaForms,
    NotificationLog,
    Sites,
    Profiles,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Escalations => "escalations",
            Table::Reports => "reports",
            Table::RcaForms => "rca_forms",
            Table::NotificationLog => "notification_log",
            Table::Sites => "sites",
            Table::Profiles => "profiles",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One row-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
    pub row_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(table: Table, op: ChangeOp, row_id: impl Into<String>) -> Self {
        Self {
            table,
            op,
            row_id: row_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","table":"{}"}}"#,
                self.table
            )
        })
    }
}

/// Sink for change events.
pub trait ChangeEmitter: Send + Sync {
    fn emit(&self, event: ChangeEvent);
}

/// Broadcast feed supporting multiple subscribers.
///
/// Dropped receivers are pruned on the next emit.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    senders: Mutex<Vec<mpsc::Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to receive change events.
    pub fn subscribe(&self) -> mpsc::Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.push(tx);
        rx
    }

    /// Number of live subscribers as of the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl ChangeEmitter for ChangeFeed {
    fn emit(&self, event: ChangeEvent) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.retain(|sender| sender.send(event.clone()).is_ok());
    }
}

/// JSONL writer for change events (CLI `--emit-changes`).
pub struct JsonlWriter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> ChangeEmitter for JsonlWriter<W> {
    fn emit(&self, event: ChangeEvent) {
        let line = event.to_jsonl();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}
