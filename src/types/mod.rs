//! Raw sample types for each tracked modality
//!
//! One aggregate `RawSample` is produced per host tick. A modality whose
//! device is not tracked this tick is `None`, never a zero pose.

use glam::{DQuat, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spatial pose of a tracked device at one instant
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PoseSample {
    pub timestamp: f64,
    pub position: DVec3,
    pub rotation: DQuat,
}

impl PoseSample {
    pub fn new(timestamp: f64, position: DVec3, rotation: DQuat) -> Self {
        Self {
            timestamp,
            position,
            rotation,
        }
    }
}

/// Eye-gaze pose plus its projection onto the viewport plane
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GazeSample {
    pub timestamp: f64,
    pub origin: DVec3,
    pub rotation: DQuat,
    /// Normalized viewport coordinates of the gaze ray intersection
    pub viewport: DVec2,
}

/// Facial expression weights keyed by blendshape name, each in [0, 1]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExpressionSample {
    pub timestamp: f64,
    pub weights: BTreeMap<String, f64>,
}

/// Locomotion and gameplay input state for one tick
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct InputSample {
    pub timestamp: f64,
    pub move_axis: DVec2,
    pub turn_axis: f64,
    pub trigger_left: f64,
    pub trigger_right: f64,
    pub primary_button: bool,
    pub secondary_button: bool,
}

/// Self-reported sickness signal, 0.0 (none) to 1.0 (severe)
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SicknessSample {
    pub timestamp: f64,
    pub score: f64,
    pub report_button_held: bool,
}

/// Everything captured from the tracking subsystems in one tick.
///
/// Produced by the acquisition layer, immutable for the tick. Absent
/// devices yield `None` for their modality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: f64,
    pub head: Option<PoseSample>,
    pub left_hand: Option<PoseSample>,
    pub right_hand: Option<PoseSample>,
    pub gaze: Option<GazeSample>,
    pub expression: Option<ExpressionSample>,
    pub input: InputSample,
    pub sickness: SicknessSample,
}

/// Tracked device slots, used for presence-transition logging
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceSlot {
    Head,
    LeftHand,
    RightHand,
    Gaze,
    Face,
}

impl DeviceSlot {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceSlot::Head => "head",
            DeviceSlot::LeftHand => "left_hand",
            DeviceSlot::RightHand => "right_hand",
            DeviceSlot::Gaze => "gaze",
            DeviceSlot::Face => "face",
        }
    }
}

/// Logs a single transition when a device appears or disappears.
///
/// Keeps absence explicit without spamming the log once per tick.
#[derive(Debug)]
pub struct DevicePresence {
    slot: DeviceSlot,
    present: Option<bool>,
}

impl DevicePresence {
    pub fn new(slot: DeviceSlot) -> Self {
        Self {
            slot,
            present: None,
        }
    }

    /// Record this tick's presence; logs only on change
    pub fn observe(&mut self, present: bool) {
        if self.present != Some(present) {
            if present {
                log::info!("{} tracking acquired", self.slot.name());
            } else {
                log::warn!("{} tracking lost, no data this tick", self.slot.name());
            }
            self.present = Some(present);
        }
    }

    pub fn is_present(&self) -> bool {
        self.present.unwrap_or(false)
    }
}
