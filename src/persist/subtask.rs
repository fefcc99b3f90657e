//! Flush subtasks: completion flags, error channel, write bodies
//!
//! The trigger loop never joins a worker. Each spawned subtask carries an
//! atomic completion flag the loop polls, and failures travel back over a
//! non-blocking error channel to be logged on the next tick.

use crossbeam::channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::persist::path_lock::PathLockTable;
use crate::persist::worker::{WriteJob, WriterPool};
use crate::record::RecordBuffer;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record buffer: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Completion flag for one in-flight subtask, polled by the trigger loop
#[derive(Clone, Debug)]
pub struct SubtaskHandle {
    done: Arc<AtomicBool>,
    pub label: String,
}

impl SubtaskHandle {
    pub fn new(label: String) -> Self {
        Self {
            done: Arc::new(AtomicBool::new(false)),
            label,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn completion_guard(&self) -> DoneGuard {
        DoneGuard(self.done.clone())
    }
}

/// Marks the subtask complete when the job body finishes, even on an early
/// return or panic, so a drain can never hang on a dead job.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Shared in-flight bookkeeping for both scheduler variants.
///
/// Owns the spawn path (completion flag + error channel wiring), the
/// backpressure retry list, and the blocking drain.
pub struct SubtaskTracker {
    pool: Arc<WriterPool>,
    in_flight: Vec<SubtaskHandle>,
    /// Jobs the bounded queue refused; retried every pump
    pending: Vec<WriteJob>,
    error_tx: Sender<PersistError>,
    error_rx: Receiver<PersistError>,
    completed: u64,
    write_errors: u64,
}

impl SubtaskTracker {
    pub fn new(pool: Arc<WriterPool>) -> Self {
        let (error_tx, error_rx) = unbounded();
        Self {
            pool,
            in_flight: Vec::new(),
            pending: Vec::new(),
            error_tx,
            error_rx,
            completed: 0,
            write_errors: 0,
        }
    }

    /// Spawn a subtask running `body` on the pool. The body's error, if any,
    /// is routed to the error channel; completion is always signalled.
    pub fn spawn(&mut self, label: String, body: impl FnOnce() -> PersistResult<()> + Send + 'static) {
        let handle = SubtaskHandle::new(label);
        let guard_source = handle.clone();
        let error_tx = self.error_tx.clone();

        let job: WriteJob = Box::new(move || {
            let _done = guard_source.completion_guard();
            if let Err(err) = body() {
                // Never blocks: the channel is unbounded and the receiver
                // lives as long as the tracker
                let _ = error_tx.send(err);
            }
        });

        if let Err(job) = self.pool.try_submit(job) {
            log::warn!("writer queue full, deferring {} to next tick", handle.label);
            self.pending.push(job);
        }
        self.in_flight.push(handle);
    }

    /// One non-blocking maintenance pass: retry deferred jobs, surface
    /// errors, reap completed subtasks.
    pub fn pump(&mut self) {
        if !self.pending.is_empty() {
            let deferred = std::mem::take(&mut self.pending);
            for job in deferred {
                if let Err(job) = self.pool.try_submit(job) {
                    self.pending.push(job);
                }
            }
        }

        while let Ok(err) = self.error_rx.try_recv() {
            self.write_errors += 1;
            log::error!("background write failed: {}", err);
        }

        let before = self.in_flight.len();
        self.in_flight.retain(|handle| !handle.is_done());
        self.completed += (before - self.in_flight.len()) as u64;
    }

    /// Block until every in-flight and deferred subtask has completed.
    /// There is no timeout; a stuck write stalls the drain indefinitely.
    pub fn drain(&mut self) {
        loop {
            self.pump();
            if self.in_flight.is_empty() && self.pending.is_empty() {
                break;
            }
            thread::sleep(Duration::from_micros(500));
        }
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }
}

/// Serialize the whole record buffer and rewrite `path` under its lock.
///
/// Returns Ok(false) when a newer snapshot already reached the path and
/// this write was skipped.
pub fn flush_record_buffer(
    buffer: &RecordBuffer,
    path: &Path,
    sequence: u64,
    locks: &PathLockTable,
) -> PersistResult<bool> {
    // Encoding happens outside the path lock; only the write holds it
    let bytes = serde_json::to_vec_pretty(buffer)?;
    write_bytes_locked(&bytes, path, sequence, locks)
}

/// Write pre-encoded bytes to `path` under its lock
pub fn write_bytes_locked(
    bytes: &[u8],
    path: &Path,
    sequence: u64,
    locks: &PathLockTable,
) -> PersistResult<bool> {
    match locks.with_path_lock(path, sequence, || {
        std::fs::write(path, bytes).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })
    }) {
        Some(Ok(())) => Ok(true),
        Some(Err(err)) => Err(err),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBuffer;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    fn tracker() -> SubtaskTracker {
        SubtaskTracker::new(Arc::new(WriterPool::new(2, 8)))
    }

    #[test]
    fn test_completion_is_signalled_and_reaped() {
        let mut tracker = tracker();
        tracker.spawn("flush".to_string(), || Ok(()));
        tracker.drain();
        assert_eq!(tracker.in_flight_len(), 0);
        assert_eq!(tracker.completed(), 1);
        assert_eq!(tracker.write_errors(), 0);
    }

    #[test]
    fn test_errors_surface_without_blocking() {
        let mut tracker = tracker();
        tracker.spawn("flush".to_string(), || {
            Err(PersistError::Io {
                path: PathBuf::from("/nonexistent/dir/file.json"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            })
        });
        tracker.drain();
        assert_eq!(tracker.in_flight_len(), 0);
        assert_eq!(tracker.write_errors(), 1);
    }

    #[test]
    fn test_deferred_jobs_eventually_run() {
        let pool = Arc::new(WriterPool::new(1, 1));
        let mut tracker = SubtaskTracker::new(pool);
        let ran = Arc::new(AtomicUsize::new(0));

        // More jobs than worker + queue slots; overflow lands in pending
        for _ in 0..6 {
            let ran = ran.clone();
            tracker.spawn("burst".to_string(), move || {
                thread::sleep(Duration::from_millis(2));
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        tracker.drain();
        assert_eq!(ran.load(Ordering::SeqCst), 6, "no deferred job may be lost");
    }

    #[test]
    fn test_flush_writes_full_buffer_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let locks = PathLockTable::new();

        let buffer = RecordBuffer::new("session_x");
        let written = flush_record_buffer(&buffer, &path, 1, &locks).unwrap();
        assert!(written);

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["session_id"], "session_x");
        assert!(value["records"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_stale_flush_skipped_after_newer_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let locks = PathLockTable::new();
        let buffer = RecordBuffer::new("s");

        assert!(flush_record_buffer(&buffer, &path, 5, &locks).unwrap());
        let skipped = flush_record_buffer(&buffer, &path, 2, &locks).unwrap();
        assert!(!skipped);
    }
}
