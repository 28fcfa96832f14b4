//! Sync Progress Tracker
//!
//! Holds the one sync job that callers poll for progress. Each change swaps
//! in a whole new snapshot, so a reader never sees a half-updated job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Where a job stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Done,
    Error(String),
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Error(_) => "error",
        }
    }
}

/// Snapshot of a sync job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub id: Uuid,
    pub completed: u32,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub tab: String,
    pub region: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_step: String,
    pub started_at: DateTime<Utc>,
}

impl SyncJob {
    fn new(tab: &str, region: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            completed: 0,
            status: SyncStatus::Running,
            tab: tab.to_string(),
            region: region.to_string(),
            current_step: String::new(),
            started_at: Utc::now(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            SyncStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Proof of which job a caller started. Updates made with a handle for a
/// job that has since been replaced are not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncHandle {
    id: Uuid,
}

impl SyncHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Shared, cloneable tracker
#[derive(Debug, Clone, Default)]
pub struct SyncTracker {
    slot: Arc<RwLock<Option<Arc<SyncJob>>>>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new job, replacing whatever was there
    pub fn start(&self, tab: &str, region: &str) -> SyncHandle {
        let job = SyncJob::new(tab, region);
        let handle = SyncHandle { id: job.id };
        tracing::info!("Sync {} started ({} / {})", job.id, tab, region);
        *self.write() = Some(Arc::new(job));
        handle
    }

    /// Count one completed step and record its label
    pub fn advance(&self, handle: &SyncHandle, label: &str) -> bool {
        self.update(handle, "advance", |job| {
            job.completed += 1;
            job.current_step = label.to_string();
        })
    }

    pub fn finish(&self, handle: &SyncHandle) -> bool {
        self.update(handle, "finish", |job| job.status = SyncStatus::Done)
    }

    pub fn fail(&self, handle: &SyncHandle, message: &str) -> bool {
        self.update(handle, "fail", |job| job.status = SyncStatus::Error(message.to_string()))
    }

    /// The current snapshot, if any
    pub fn current(&self) -> Option<Arc<SyncJob>> {
        self.read().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.read()
            .as_ref()
            .is_some_and(|job| job.status == SyncStatus::Running)
    }

    pub fn clear(&self) {
        *self.write() = None;
    }

    fn update(&self, handle: &SyncHandle, what: &str, apply: impl FnOnce(&mut SyncJob)) -> bool {
        let mut slot = self.write();
        let Some(current) = slot.as_ref() else {
            tracing::debug!("Ignoring {} for sync {}: no active job", what, handle.id);
            return false;
        };

        if current.id != handle.id {
            tracing::debug!("Ignoring {} for superseded sync {} (active: {})", what, handle.id, current.id);
            return false;
        }
        if current.status.is_terminal() {
            tracing::debug!("Ignoring {} for sync {}: already {}", what, handle.id, current.status.as_str());
            return false;
        }

        let mut next = SyncJob::clone(current);
        apply(&mut next);
        *slot = Some(Arc::new(next));
        true
    }

    // The slot only ever holds a complete snapshot, so a poisoned lock
    // still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, Option<Arc<SyncJob>>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Arc<SyncJob>>> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }
}
