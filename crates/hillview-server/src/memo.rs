//! Replay of completed operations.
//!
//! Operations are pure functions of their source dataset, so the final
//! response of a command can be replayed for any later command with the
//! same bytes on the same handle.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};

use hillview_dataset::wire::PartialResponse;

use crate::datasets::DatasetTable;

/// Serialized operation plus the handle it ran on.
pub type MemoKey = (Vec<u8>, usize);

/// The response standing in for a whole completed operation.
#[derive(Debug, Clone)]
pub struct MemoEntry {
    pub response: PartialResponse,
    /// Handle of the dataset the operation produced, if any.
    pub produced: Option<usize>,
}

pub struct MemoCache {
    enabled: AtomicBool,
    entries: DashMap<MemoKey, MemoEntry>,
}

impl MemoCache {
    pub fn new(enabled: bool) -> Self {
        MemoCache {
            enabled: AtomicBool::new(enabled),
            entries: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Flip memoization and return the new state.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::AcqRel)
    }

    /// A cached response, provided every dataset it refers to is still
    /// alive in `datasets`.
    pub fn get(&self, key: &MemoKey, datasets: &DatasetTable) -> Option<PartialResponse> {
        if !self.is_enabled() {
            return None;
        }
        let entry = self.entries.get(key)?.value().clone();
        let alive = datasets.contains(key.1) && entry.produced.map_or(true, |h| datasets.contains(h));
        if !alive {
            debug!("Dropping stale memoized result on {}#{}", datasets.address(), key.1);
            self.entries.remove(key);
            return None;
        }
        Some(entry.response)
    }

    pub fn insert(&self, key: MemoKey, entry: MemoEntry) {
        if self.is_enabled() {
            self.entries.insert(key, entry);
        }
    }

    /// Drop every entry, returning how many there were.
    pub fn purge(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        info!("Purged {} memoized results", count);
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
