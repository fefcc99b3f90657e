//! Synthetic tracking rig
//!
//! Stand-in for the hardware acquisition subsystems: produces one
//! deterministic `RawSample` per tick with plausible head bob, controller
//! sweep, gaze wander, expression oscillation, and a slowly drifting
//! sickness score. Simulates a controller tracking dropout window so the
//! presence-transition path gets exercised in a live run.

use glam::{DQuat, DVec2, DVec3};
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::types::{
    ExpressionSample, GazeSample, InputSample, PoseSample, RawSample, SicknessSample,
};

const EXPRESSION_KEYS: [&str; 4] = ["brow_raise", "jaw_open", "eye_squint", "cheek_puff"];

/// Ticks during which the left controller reports no tracking
const LEFT_DROPOUT: std::ops::Range<u64> = 600..750;

pub struct SyntheticRig {
    tick: u64,
    elapsed: f64,
}

impl SyntheticRig {
    pub fn new() -> Self {
        Self {
            tick: 0,
            elapsed: 0.0,
        }
    }

    pub fn sample(&mut self, dt: f64) -> RawSample {
        self.elapsed += dt;
        self.tick += 1;
        let t = self.elapsed;
        let timestamp = crate::status::current_timestamp();

        // Head: gentle bob and slow yaw sweep
        let head = PoseSample::new(
            timestamp,
            DVec3::new((t * 0.4).sin() * 0.15, 1.7 + (t * 2.2).sin() * 0.02, 0.0),
            DQuat::from_rotation_y((t * 0.3).sin() * 0.4),
        );

        let left_hand = if LEFT_DROPOUT.contains(&self.tick) {
            None
        } else {
            Some(PoseSample::new(
                timestamp,
                DVec3::new(-0.25 + (t * 1.1).sin() * 0.2, 1.2, -0.3 + (t * 1.3).cos() * 0.1),
                DQuat::from_rotation_x((t * 1.1).cos() * 0.6),
            ))
        };

        let right_hand = Some(PoseSample::new(
            timestamp,
            DVec3::new(0.25 + (t * 0.9).cos() * 0.2, 1.2, -0.3 + (t * 1.7).sin() * 0.1),
            DQuat::from_rotation_x((t * 0.9).sin() * 0.6),
        ));

        let gaze = Some(GazeSample {
            timestamp,
            origin: head.position,
            rotation: DQuat::from_rotation_y((t * 0.8).sin() * 0.3)
                * DQuat::from_rotation_x((t * 0.6).cos() * 0.15),
            viewport: DVec2::new(
                0.5 + (t * 0.8).sin() * 0.3,
                0.5 + (t * 0.6).cos() * 0.2,
            ),
        });

        let mut weights = BTreeMap::new();
        for (index, key) in EXPRESSION_KEYS.iter().enumerate() {
            let phase = t * (0.5 + index as f64 * 0.2);
            weights.insert(key.to_string(), (phase.sin() * 0.5 + 0.5).clamp(0.0, 1.0));
        }
        let expression = Some(ExpressionSample { timestamp, weights });

        let input = InputSample {
            timestamp,
            move_axis: DVec2::new((t * 0.2).sin(), (t * 0.2).cos()),
            turn_axis: (t * 0.15).sin() * 0.5,
            trigger_left: ((t * 0.7).sin() * 0.5 + 0.5).clamp(0.0, 1.0),
            trigger_right: ((t * 0.5).cos() * 0.5 + 0.5).clamp(0.0, 1.0),
            primary_button: (t % 4.0) < 0.1,
            secondary_button: false,
        };

        // Slow sickness drift with a mild periodic component
        let score = (0.15 * (t / 60.0) + 0.1 * (t * 2.0 * PI / 90.0).sin())
            .clamp(0.0, 1.0);
        let sickness = SicknessSample {
            timestamp,
            score,
            report_button_held: (t % 30.0) < 0.2,
        };

        RawSample {
            timestamp,
            head: Some(head),
            left_hand,
            right_hand,
            gaze,
            expression,
            input,
            sickness,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }
}

impl Default for SyntheticRig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_has_all_modalities_outside_dropout() {
        let mut rig = SyntheticRig::new();
        let raw = rig.sample(0.02);
        assert!(raw.head.is_some());
        assert!(raw.left_hand.is_some());
        assert!(raw.right_hand.is_some());
        assert!(raw.gaze.is_some());
        assert!(raw.expression.is_some());
    }

    #[test]
    fn test_left_hand_dropout_window() {
        let mut rig = SyntheticRig::new();
        let mut saw_dropout = false;
        let mut recovered = false;
        for _ in 0..1000 {
            let raw = rig.sample(0.02);
            if raw.left_hand.is_none() {
                saw_dropout = true;
            } else if saw_dropout {
                recovered = true;
            }
        }
        assert!(saw_dropout, "dropout window must occur");
        assert!(recovered, "tracking must come back after the window");
    }

    #[test]
    fn test_expression_weights_in_unit_range() {
        let mut rig = SyntheticRig::new();
        for _ in 0..100 {
            let raw = rig.sample(0.02);
            for (_, weight) in &raw.expression.unwrap().weights {
                assert!((0.0..=1.0).contains(weight));
            }
        }
    }

    #[test]
    fn test_sickness_bounded() {
        let mut rig = SyntheticRig::new();
        for _ in 0..2000 {
            let raw = rig.sample(0.05);
            assert!((0.0..=1.0).contains(&raw.sickness.score));
        }
    }
}
