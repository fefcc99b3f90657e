//! Per-path write exclusivity registry
//!
//! Worker threads writing to the same output path are serialized by a
//! per-path token. The registry's own lock is held only for
//! insert/lookup/remove, never across a write, so unrelated paths do not
//! contend.
//!
//! Each path also carries a monotone write sequence. A flush that acquires
//! the token after a newer snapshot has already been written is skipped, so
//! the final content of a path is always the newest snapshot no matter which
//! racing subtask wins the lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Entry {
    token: Mutex<()>,
}

#[derive(Debug)]
struct Slot {
    holders: usize,
    entry: Arc<Entry>,
}

#[derive(Debug, Default)]
struct TableInner {
    slots: HashMap<PathBuf, Slot>,
    /// Newest sequence written per path. Outlives the exclusivity entries,
    /// which come and go with their holders; one path per rotation epoch
    /// keeps this map tiny for any session length.
    last_written: HashMap<PathBuf, u64>,
}

#[derive(Debug, Default)]
pub struct PathLockTable {
    inner: Mutex<TableInner>,
}

impl PathLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> MutexGuard<'_, TableInner> {
        // A poisoned registry still holds consistent data; recover the guard
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn checkout(&self, path: &Path) -> Arc<Entry> {
        let mut inner = self.lock_inner();
        let slot = inner
            .slots
            .entry(path.to_path_buf())
            .or_insert_with(|| Slot {
                holders: 0,
                entry: Arc::new(Entry::default()),
            });
        slot.holders += 1;
        slot.entry.clone()
    }

    fn release(&self, path: &Path) {
        let mut inner = self.lock_inner();
        if let Some(slot) = inner.slots.get_mut(path) {
            slot.holders -= 1;
            if slot.holders == 0 {
                inner.slots.remove(path);
            }
        }
    }

    fn is_stale(&self, path: &Path, sequence: u64) -> bool {
        let inner = self.lock_inner();
        inner
            .last_written
            .get(path)
            .is_some_and(|newest| sequence < *newest)
    }

    fn record_written(&self, path: &Path, sequence: u64) {
        let mut inner = self.lock_inner();
        let newest = inner.last_written.entry(path.to_path_buf()).or_insert(0);
        *newest = (*newest).max(sequence);
    }

    /// Run `write` while holding this path's exclusivity token.
    ///
    /// Returns `None` without calling `write` when a newer sequence already
    /// reached the path. A failed write does not advance the sequence, so a
    /// later snapshot is still accepted.
    pub fn with_path_lock<T, E>(
        &self,
        path: &Path,
        sequence: u64,
        write: impl FnOnce() -> Result<T, E>,
    ) -> Option<Result<T, E>> {
        let entry = self.checkout(path);
        let result = {
            let _token = entry
                .token
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if self.is_stale(path, sequence) {
                log::debug!(
                    "skipping superseded write (seq {}) to {}",
                    sequence,
                    path.display()
                );
                None
            } else {
                let outcome = write();
                if outcome.is_ok() {
                    self.record_written(path, sequence);
                }
                Some(outcome)
            }
        };
        self.release(path);
        result
    }

    /// Number of paths with at least one current holder
    pub fn active_locks(&self) -> usize {
        self.lock_inner().slots.len()
    }
}
