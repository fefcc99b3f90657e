//! Record-flush scheduler
//!
//! Runs on the trigger thread, once per host tick. A short countdown flushes
//! the accumulated buffer to the current epoch file; a longer countdown
//! rotates to a fresh timestamped file. All file I/O happens on the writer
//! pool; the tick path only snapshots, spawns, and polls.

use std::path::PathBuf;
use std::sync::Arc;

use crate::persist::path_lock::PathLockTable;
use crate::persist::subtask::{flush_record_buffer, PersistError, PersistResult, SubtaskTracker};
use crate::persist::worker::WriterPool;
use crate::record::RecordBuffer;

pub struct RecordScheduler {
    output_dir: PathBuf,
    flush_interval: f64,
    rotation_interval: f64,
    flush_countdown: f64,
    rotation_countdown: f64,
    /// Countdown-triggered spawning; disabled while draining
    enabled: bool,
    buffer: RecordBuffer,
    current_path: PathBuf,
    epoch: u64,
    next_sequence: u64,
    tracker: SubtaskTracker,
    locks: Arc<PathLockTable>,
    flushes_spawned: u64,
    rotations: u64,
}

impl RecordScheduler {
    pub fn new(
        output_dir: PathBuf,
        session_id: &str,
        flush_interval: f64,
        rotation_interval: f64,
        pool: Arc<WriterPool>,
        locks: Arc<PathLockTable>,
    ) -> PersistResult<Self> {
        std::fs::create_dir_all(&output_dir).map_err(|source| PersistError::CreateDir {
            path: output_dir.clone(),
            source,
        })?;

        let epoch = 0;
        let current_path = record_path(&output_dir, epoch);
        let mut scheduler = Self {
            output_dir,
            flush_interval,
            rotation_interval,
            flush_countdown: flush_interval,
            rotation_countdown: rotation_interval,
            enabled: true,
            buffer: RecordBuffer::new(session_id),
            current_path,
            epoch,
            next_sequence: 1,
            tracker: SubtaskTracker::new(pool),
            locks,
            flushes_spawned: 0,
            rotations: 0,
        };

        // The epoch file exists from the start, even while still empty
        scheduler.spawn_flush(scheduler.current_path.clone());
        Ok(scheduler)
    }

    /// Accumulation point for the sampling loop
    pub fn buffer_mut(&mut self) -> &mut RecordBuffer {
        &mut self.buffer
    }

    /// One trigger-loop pass: reap finished subtasks, surface errors, and
    /// fire whichever countdowns expired. Never blocks.
    pub fn tick(&mut self, dt: f64) {
        self.tracker.pump();

        if !self.enabled {
            return;
        }

        self.flush_countdown -= dt;
        if self.flush_countdown <= 0.0 {
            self.flush_countdown = self.flush_interval;
            self.spawn_flush(self.current_path.clone());
        }

        self.rotation_countdown -= dt;
        if self.rotation_countdown <= 0.0 {
            self.rotation_countdown = self.rotation_interval;
            self.rotate();
        }
    }

    /// Final flush under the old path, then switch to a fresh buffer and a
    /// new timestamped file, flushed immediately so it exists even if empty.
    fn rotate(&mut self) {
        self.spawn_flush(self.current_path.clone());

        self.epoch += 1;
        self.rotations += 1;
        self.current_path = record_path(&self.output_dir, self.epoch);
        self.buffer = self.buffer.next_epoch();

        self.spawn_flush(self.current_path.clone());
        log::info!(
            "rotated record output to {} ({} epochs)",
            self.current_path.display(),
            self.epoch
        );
    }

    /// Snapshot the whole accumulated buffer by value and hand it to a
    /// subtask. Each flush rewrites the entire file; the per-path sequence
    /// guarantees the newest snapshot wins regardless of completion order.
    fn spawn_flush(&mut self, path: PathBuf) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let snapshot = self.buffer.clone();
        let locks = self.locks.clone();
        let label = format!("records seq {}", sequence);

        self.flushes_spawned += 1;
        self.tracker.spawn(label, move || {
            flush_record_buffer(&snapshot, &path, sequence, &locks).map(|_| ())
        });
    }

    /// Spawn an immediate flush of the accumulated buffer, outside the
    /// countdown cadence. Used for the final save at shutdown.
    pub fn flush_now(&mut self) {
        self.spawn_flush(self.current_path.clone());
    }

    /// Blocking drain for shutdown/pause: stop countdown-triggered spawning
    /// and rotation, pump until the in-flight set is empty, then restore the
    /// previous enabled state. Calling this twice in a row is a no-op the
    /// second time.
    pub fn complete_all_subtasks(&mut self) {
        let was_enabled = self.enabled;
        self.enabled = false;
        self.tracker.drain();
        self.enabled = was_enabled;
    }

    pub fn current_path(&self) -> &PathBuf {
        &self.current_path
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight_len()
    }

    pub fn flushes_spawned(&self) -> u64 {
        self.flushes_spawned
    }

    pub fn flushes_completed(&self) -> u64 {
        self.tracker.completed()
    }

    pub fn write_errors(&self) -> u64 {
        self.tracker.write_errors()
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub fn pending_records(&self) -> usize {
        self.buffer.len()
    }
}

fn record_path(output_dir: &std::path::Path, epoch: u64) -> PathBuf {
    // Wall-clock stamp for humans, epoch counter for strict ordering even
    // within one second
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    output_dir.join(format!("records_{}_{:04}.json", stamp, epoch))
}
