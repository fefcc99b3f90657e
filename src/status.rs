use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub ticks: u64,
    pub records_pending: usize,
    pub record_flushes_spawned: u64,
    pub record_flushes_completed: u64,
    pub record_rotations: u64,
    pub record_write_errors: u64,
    pub readbacks_requested: u64,
    pub frames_written: u64,
    pub frame_write_errors: u64,
    pub record_in_flight: usize,
    pub frame_in_flight: usize,
    pub head_tracked: bool,
    pub left_hand_tracked: bool,
    pub right_hand_tracked: bool,
    pub gaze_tracked: bool,
    pub face_tracked: bool,
    pub sickness_score: f64,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            ..Self::default()
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
