//! Telemetry records and the per-tick double buffer
//!
//! A record is populated over one tick, appended to the active
//! `RecordBuffer`, and immutable from then on. The buffer is an append-only
//! sequence owned by the sampling loop until flush time, when ownership of a
//! snapshot moves to a persistence subtask and the loop keeps writing into
//! the same (or, on rotation, a fresh) buffer.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::filters::ema::ContinuousEmaConfig;
use crate::pose::FilteredPose;
use crate::types::{InputSample, SicknessSample};

/// Monotonically increasing timestamp set for one record
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct RecordTimestamps {
    pub tick_index: u64,
    pub elapsed_seconds: f64,
    pub delta_seconds: f64,
    pub unix_seconds: f64,
}

/// One tick's worth of filtered telemetry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamps: RecordTimestamps,
    pub head: Option<FilteredPose>,
    pub left_hand: Option<FilteredPose>,
    pub right_hand: Option<FilteredPose>,
    pub gaze: Option<FilteredPose>,
    /// Normalized viewport coordinates of the gaze projection
    pub viewport: Option<DVec2>,
    pub expression_weights: Option<BTreeMap<String, f64>>,
    pub input: InputSample,
    pub sickness: SicknessSample,
    /// Smoothing parameters actually applied this tick
    pub ema: ContinuousEmaConfig,
}

/// Append-only sequence of records for one rotation epoch.
///
/// Handed to a flush subtask by value; the sampling loop and a pending
/// write never alias the same storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordBuffer {
    pub session_id: String,
    pub created_at: String,
    pub records: Vec<TelemetryRecord>,
}

impl RecordBuffer {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: TelemetryRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fresh empty buffer for the next rotation epoch, same session
    pub fn next_epoch(&self) -> Self {
        Self::new(&self.session_id)
    }
}

/// Two owned record slots swapped exactly once per tick.
///
/// The current record is populated from raw samples using the previous
/// record as filter input, appended to the buffer, then becomes the new
/// previous. A superseded previous is never mutated again; history readers
/// only ever see the buffer, not the live slot.
#[derive(Debug, Default)]
pub struct RecordDoubleBuffer {
    previous: Option<TelemetryRecord>,
    swap_count: u64,
}

impl RecordDoubleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter input for the tick being populated
    pub fn previous(&self) -> Option<&TelemetryRecord> {
        self.previous.as_ref()
    }

    /// Append the finished record to the active buffer and swap it into the
    /// previous slot. The one swap per tick.
    pub fn commit(&mut self, current: TelemetryRecord, buffer: &mut RecordBuffer) {
        buffer.push(current.clone());
        self.previous = Some(current);
        self.swap_count += 1;
    }

    pub fn swap_count(&self) -> u64 {
        self.swap_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::FilteredPose;
    use glam::{DQuat, DVec3};

    fn record(tick: u64) -> TelemetryRecord {
        TelemetryRecord {
            timestamps: RecordTimestamps {
                tick_index: tick,
                elapsed_seconds: tick as f64 * 0.02,
                delta_seconds: 0.02,
                unix_seconds: 1_700_000_000.0 + tick as f64 * 0.02,
            },
            head: Some(FilteredPose::at_rest(
                DVec3::new(0.0, 1.7, 0.0),
                DQuat::IDENTITY,
            )),
            left_hand: None,
            right_hand: None,
            gaze: None,
            viewport: None,
            expression_weights: None,
            input: InputSample::default(),
            sickness: SicknessSample::default(),
            ema: ContinuousEmaConfig::rectify(0.3, 0.02, 0.02),
        }
    }

    #[test]
    fn test_one_swap_per_commit() {
        let mut buffer = RecordBuffer::new("s1");
        let mut slots = RecordDoubleBuffer::new();

        for tick in 0..5 {
            slots.commit(record(tick), &mut buffer);
        }
        assert_eq!(slots.swap_count(), 5);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_previous_slot_matches_last_commit() {
        let mut buffer = RecordBuffer::new("s1");
        let mut slots = RecordDoubleBuffer::new();
        assert!(slots.previous().is_none());

        slots.commit(record(0), &mut buffer);
        slots.commit(record(1), &mut buffer);
        assert_eq!(slots.previous().unwrap().timestamps.tick_index, 1);
    }

    #[test]
    fn test_superseded_record_not_mutated_by_later_ticks() {
        let mut buffer = RecordBuffer::new("s1");
        let mut slots = RecordDoubleBuffer::new();

        slots.commit(record(0), &mut buffer);
        let snapshot = buffer.records[0].clone();

        slots.commit(record(1), &mut buffer);
        slots.commit(record(2), &mut buffer);

        assert_eq!(
            buffer.records[0].timestamps.tick_index,
            snapshot.timestamps.tick_index
        );
        assert_eq!(
            buffer.records[0].timestamps.unix_seconds,
            snapshot.timestamps.unix_seconds
        );
    }

    #[test]
    fn test_next_epoch_keeps_session_id_and_clears_records() {
        let mut buffer = RecordBuffer::new("session_abc");
        buffer.push(record(0));

        let fresh = buffer.next_epoch();
        assert_eq!(fresh.session_id, "session_abc");
        assert!(fresh.is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_buffer_timestamps_strictly_increase() {
        let mut buffer = RecordBuffer::new("s1");
        for tick in 0..10 {
            buffer.push(record(tick));
        }
        for pair in buffer.records.windows(2) {
            assert!(pair[1].timestamps.elapsed_seconds > pair[0].timestamps.elapsed_seconds);
            assert!(pair[1].timestamps.tick_index > pair[0].timestamps.tick_index);
        }
    }
}
