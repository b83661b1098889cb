//! Live query change model
//!
//! Remote change notifications arrive as [`DocumentChange`]s grouped in
//! batches; the synchronizer turns them into [`SyncEvent`]s for subscribers.

use serde::{Deserialize, Serialize};

/// Confirmation state of the write behind a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// Acknowledged by the remote store
    #[default]
    Confirmed,
    /// Accepted locally, not yet confirmed (shown as "offline")
    Pending,
    /// Rejected by the remote store
    Failed,
}

impl WriteStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, WriteStatus::Pending)
    }
}

/// Kind of change reported by a live query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One change notification from a live query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange<T> {
    pub kind: ChangeKind,
    pub document: T,
    pub status: WriteStatus,
}

impl<T> DocumentChange<T> {
    pub fn new(kind: ChangeKind, document: T, status: WriteStatus) -> Self {
        Self {
            kind,
            document,
            status,
        }
    }
}

/// Changes delivered together by one live query notification
pub type ChangeBatch<T> = Vec<DocumentChange<T>>;

/// Typed change event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum SyncEvent<T> {
    Added(T),
    Modified(T),
    Removed(T),
}

impl<T> SyncEvent<T> {
    pub fn from_kind(kind: ChangeKind, record: T) -> Self {
        match kind {
            ChangeKind::Added => SyncEvent::Added(record),
            ChangeKind::Modified => SyncEvent::Modified(record),
            ChangeKind::Removed => SyncEvent::Removed(record),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            SyncEvent::Added(_) => ChangeKind::Added,
            SyncEvent::Modified(_) => ChangeKind::Modified,
            SyncEvent::Removed(_) => ChangeKind::Removed,
        }
    }

    pub fn record(&self) -> &T {
        match self {
            SyncEvent::Added(r) | SyncEvent::Modified(r) | SyncEvent::Removed(r) => r,
        }
    }

    pub fn into_record(self) -> T {
        match self {
            SyncEvent::Added(r) | SyncEvent::Modified(r) | SyncEvent::Removed(r) => r,
        }
    }
}
