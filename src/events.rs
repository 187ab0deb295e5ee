//! Observational event stream.
//!
//! Each [`StoreManager`](crate::StoreManager) owns one [`EventBus`]; hosts call
//! `subscribe()` to receive [`StoreEvent`]s for logging or metering. Events never
//! influence control flow, and every event is mirrored to `tracing` so a host with
//! only a subscriber installed still sees them.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{ErrorKind, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Open,
    Close,
    Query,
    Migration,
    Backup,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Open {
        path: PathBuf,
        journal_mode: String,
    },
    Close {
        path: PathBuf,
        statements_released: usize,
    },
    Query {
        sql: String,
        rows: usize,
        elapsed_ms: u64,
    },
    Migration {
        version: i64,
        name: String,
        identifier: String,
    },
    Backup {
        filename: String,
        size_bytes: u64,
        pruned: usize,
    },
    Error {
        operation: String,
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl StoreEvent {
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        let kind = match &payload {
            EventPayload::Open { .. } => EventKind::Open,
            EventPayload::Close { .. } => EventKind::Close,
            EventPayload::Query { .. } => EventKind::Query,
            EventPayload::Migration { .. } => EventKind::Migration,
            EventPayload::Backup { .. } => EventKind::Backup,
            EventPayload::Error { .. } => EventKind::Error,
        };
        Self {
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Bounded fan-out channel owned by a single manager.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn emit(&self, payload: EventPayload) {
        trace_payload(&payload);
        // No subscribers is the common case and not an error.
        let _ = self.sender.send(StoreEvent::new(payload));
    }

    pub(crate) fn error(&self, operation: &str, err: &StoreError) {
        self.emit(EventPayload::Error {
            operation: operation.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

fn trace_payload(payload: &EventPayload) {
    match payload {
        EventPayload::Open { path, journal_mode } => {
            tracing::info!(path = %path.display(), journal_mode, "store opened");
        }
        EventPayload::Close {
            path,
            statements_released,
        } => {
            tracing::info!(path = %path.display(), statements_released, "store closed");
        }
        EventPayload::Query {
            sql,
            rows,
            elapsed_ms,
        } => {
            tracing::debug!(sql, rows, elapsed_ms, "statement executed");
        }
        EventPayload::Migration {
            version,
            name,
            identifier,
        } => {
            tracing::info!(version, name, identifier, "migration applied");
        }
        EventPayload::Backup {
            filename,
            size_bytes,
            pruned,
        } => {
            tracing::info!(filename, size_bytes, pruned, "backup created");
        }
        EventPayload::Error {
            operation,
            kind,
            message,
        } => {
            tracing::warn!(operation, ?kind, message, "store operation failed");
        }
    }
}
