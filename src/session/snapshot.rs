// src/session/snapshot.rs

use std::sync::{Arc, PoisonError, RwLock};

use super::SessionState;
use crate::history::HistoryPoint;
use crate::processing::bpm::BpmStats;

/// Immutable copy of the session as seen by renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: SessionState,
    pub history: Vec<HistoryPoint>,
    pub current_bpm: Option<f64>,
    pub stats: Option<BpmStats>,
    pub dropped_samples: u64,
    pub filter_enabled: bool,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            state: SessionState::Idle,
            history: Vec::new(),
            current_bpm: None,
            stats: None,
            dropped_samples: 0,
            filter_enabled: false,
        }
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.history.last()
    }
}

/// Publication slot written by the controller.
pub(crate) type SharedSnapshot = Arc<RwLock<Arc<Snapshot>>>;

pub(crate) fn create_shared_snapshot() -> SharedSnapshot {
    Arc::new(RwLock::new(Arc::new(Snapshot::empty())))
}

pub(crate) fn publish(shared: &SharedSnapshot, snapshot: Snapshot) {
    let mut slot = shared.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Arc::new(snapshot);
}

/// Read side of the publication slot; cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    shared: SharedSnapshot,
}

impl SnapshotReader {
    pub(crate) fn new(shared: SharedSnapshot) -> Self {
        Self { shared }
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        let slot = self.shared.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot)
    }
}
