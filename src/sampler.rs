//! Per-tick sampling pipeline: raw sample in, telemetry record out
//!
//! Runs on the host trigger thread. Filter math is cheap relative to the
//! persistence work, so the whole pipeline executes inline before any
//! scheduler handoff.

use crate::filters::ema::ContinuousEmaConfig;
use crate::pose::{FilteredPose, PoseFilter};
use crate::record::{RecordBuffer, RecordDoubleBuffer, RecordTimestamps, TelemetryRecord};
use crate::types::{DevicePresence, DeviceSlot, PoseSample, RawSample};

pub struct TelemetrySampler {
    alpha_ideal: f64,
    tick_interval_ideal: f64,
    slots: RecordDoubleBuffer,
    head_presence: DevicePresence,
    left_presence: DevicePresence,
    right_presence: DevicePresence,
    gaze_presence: DevicePresence,
    face_presence: DevicePresence,
    tick_index: u64,
    elapsed_seconds: f64,
}

impl TelemetrySampler {
    pub fn new(alpha_ideal: f64, tick_interval_ideal: f64) -> Self {
        Self {
            alpha_ideal,
            tick_interval_ideal,
            slots: RecordDoubleBuffer::new(),
            head_presence: DevicePresence::new(DeviceSlot::Head),
            left_presence: DevicePresence::new(DeviceSlot::LeftHand),
            right_presence: DevicePresence::new(DeviceSlot::RightHand),
            gaze_presence: DevicePresence::new(DeviceSlot::Gaze),
            face_presence: DevicePresence::new(DeviceSlot::Face),
            tick_index: 0,
            elapsed_seconds: 0.0,
        }
    }

    /// Filter this tick's raw sample, append the resulting record to the
    /// active buffer, and swap the double buffer. Exactly one swap per call.
    pub fn tick(&mut self, raw: &RawSample, dt: f64, buffer: &mut RecordBuffer) -> RecordTimestamps {
        self.elapsed_seconds += dt;
        let ema = ContinuousEmaConfig::rectify(self.alpha_ideal, self.tick_interval_ideal, dt);

        self.head_presence.observe(raw.head.is_some());
        self.left_presence.observe(raw.left_hand.is_some());
        self.right_presence.observe(raw.right_hand.is_some());
        self.gaze_presence.observe(raw.gaze.is_some());
        self.face_presence.observe(raw.expression.is_some());

        let prev = self.slots.previous();
        let head = step_pose(raw.head.as_ref(), prev.and_then(|r| r.head.as_ref()), &ema, dt);
        let left_hand = step_pose(
            raw.left_hand.as_ref(),
            prev.and_then(|r| r.left_hand.as_ref()),
            &ema,
            dt,
        );
        let right_hand = step_pose(
            raw.right_hand.as_ref(),
            prev.and_then(|r| r.right_hand.as_ref()),
            &ema,
            dt,
        );
        let gaze = match raw.gaze {
            Some(g) => {
                let as_pose = PoseSample::new(g.timestamp, g.origin, g.rotation);
                step_pose(Some(&as_pose), prev.and_then(|r| r.gaze.as_ref()), &ema, dt)
            }
            None => None,
        };

        let timestamps = RecordTimestamps {
            tick_index: self.tick_index,
            elapsed_seconds: self.elapsed_seconds,
            delta_seconds: dt,
            unix_seconds: raw.timestamp,
        };

        let record = TelemetryRecord {
            timestamps,
            head,
            left_hand,
            right_hand,
            gaze,
            viewport: raw.gaze.map(|g| g.viewport),
            expression_weights: raw.expression.as_ref().map(|e| e.weights.clone()),
            input: raw.input,
            sickness: raw.sickness,
            ema,
        };

        self.slots.commit(record, buffer);
        self.tick_index += 1;
        timestamps
    }

    pub fn swap_count(&self) -> u64 {
        self.slots.swap_count()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }
}

/// Advance one modality. A freshly appeared device starts at rest; an
/// absent device yields no data this tick.
fn step_pose(
    raw: Option<&PoseSample>,
    prev: Option<&FilteredPose>,
    ema: &ContinuousEmaConfig,
    dt: f64,
) -> Option<FilteredPose> {
    let sample = raw?;
    Some(match prev {
        Some(prev) => PoseFilter::step(prev, sample.position, sample.rotation, ema, dt),
        None => FilteredPose::at_rest(sample.position, sample.rotation),
    })
}
