//! Filtered kinematic state per tracked device
//!
//! Each tick produces a `FilteredPose` holding two parallel chains: the raw
//! chain (finite-difference estimates computed only from the previous raw
//! fields) and the filtered chain (continuous-EMA blend of the previous
//! filtered value with this tick's raw value). The raw chain never reads
//! filtered fields, so the filter cannot feed back into the raw signal.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::filters::ema::ContinuousEmaConfig;
use crate::filters::{angular_acceleration, angular_velocity, linear_acceleration, linear_velocity};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FilteredPose {
    // Raw chain: this tick's finite-difference estimates
    pub raw_position: DVec3,
    pub raw_rotation: DQuat,
    pub raw_velocity: DVec3,
    pub raw_angular_velocity: DVec3,
    pub raw_acceleration: DVec3,
    pub raw_angular_acceleration: DVec3,

    // Filtered chain: smoothed estimates
    pub position: DVec3,
    pub rotation: DQuat,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub acceleration: DVec3,
    pub angular_acceleration: DVec3,

    // Scalar magnitudes of every vector quantity above
    pub raw_velocity_magnitude: f64,
    pub raw_angular_velocity_magnitude: f64,
    pub raw_acceleration_magnitude: f64,
    pub raw_angular_acceleration_magnitude: f64,
    pub velocity_magnitude: f64,
    pub angular_velocity_magnitude: f64,
    pub acceleration_magnitude: f64,
    pub angular_acceleration_magnitude: f64,
}

impl Default for FilteredPose {
    fn default() -> Self {
        Self::at_rest(DVec3::ZERO, DQuat::IDENTITY)
    }
}

impl FilteredPose {
    /// State for a device that has just appeared: no motion history yet
    pub fn at_rest(position: DVec3, rotation: DQuat) -> Self {
        Self {
            raw_position: position,
            raw_rotation: rotation,
            raw_velocity: DVec3::ZERO,
            raw_angular_velocity: DVec3::ZERO,
            raw_acceleration: DVec3::ZERO,
            raw_angular_acceleration: DVec3::ZERO,
            position,
            rotation,
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            acceleration: DVec3::ZERO,
            angular_acceleration: DVec3::ZERO,
            raw_velocity_magnitude: 0.0,
            raw_angular_velocity_magnitude: 0.0,
            raw_acceleration_magnitude: 0.0,
            raw_angular_acceleration_magnitude: 0.0,
            velocity_magnitude: 0.0,
            angular_velocity_magnitude: 0.0,
            acceleration_magnitude: 0.0,
            angular_acceleration_magnitude: 0.0,
        }
    }
}

/// Advances one device's `FilteredPose` per tick
pub struct PoseFilter;

impl PoseFilter {
    /// Compute the next pose state from the previous state and this tick's
    /// raw position/rotation sample.
    ///
    /// Derivative estimates that come back `None` (degenerate dt, NaN input)
    /// hold the previous value, treated as "no sample yet".
    pub fn step(
        prev: &FilteredPose,
        raw_position: DVec3,
        raw_rotation: DQuat,
        ema: &ContinuousEmaConfig,
        dt: f64,
    ) -> FilteredPose {
        // Raw chain: previous raw fields only
        let raw_velocity =
            linear_velocity(prev.raw_position, raw_position, dt).unwrap_or(prev.raw_velocity);
        let raw_acceleration = linear_acceleration(prev.raw_velocity, raw_velocity, dt)
            .unwrap_or(prev.raw_acceleration);
        let raw_angular_velocity = angular_velocity(prev.raw_rotation, raw_rotation, dt)
            .unwrap_or(prev.raw_angular_velocity);
        let raw_angular_acceleration =
            angular_acceleration(prev.raw_angular_velocity, raw_angular_velocity, dt)
                .unwrap_or(prev.raw_angular_acceleration);

        // Filtered chain: previous filtered value blended with this raw value
        let position = ema.blend_vec3(raw_position, prev.position);
        let rotation = ema.blend_quat(raw_rotation, prev.rotation);
        let velocity = ema.blend_vec3(raw_velocity, prev.velocity);
        let angular_velocity = ema.blend_vec3(raw_angular_velocity, prev.angular_velocity);
        let acceleration = ema.blend_vec3(raw_acceleration, prev.acceleration);
        let angular_acceleration =
            ema.blend_vec3(raw_angular_acceleration, prev.angular_acceleration);

        FilteredPose {
            raw_position,
            raw_rotation,
            raw_velocity,
            raw_angular_velocity,
            raw_acceleration,
            raw_angular_acceleration,
            position,
            rotation,
            velocity,
            angular_velocity,
            acceleration,
            angular_acceleration,
            raw_velocity_magnitude: raw_velocity.length(),
            raw_angular_velocity_magnitude: raw_angular_velocity.length(),
            raw_acceleration_magnitude: raw_acceleration.length(),
            raw_angular_acceleration_magnitude: raw_angular_acceleration.length(),
            velocity_magnitude: velocity.length(),
            angular_velocity_magnitude: angular_velocity.length(),
            acceleration_magnitude: acceleration.length(),
            angular_acceleration_magnitude: angular_acceleration.length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 0.02;

    fn ema() -> ContinuousEmaConfig {
        ContinuousEmaConfig::rectify(0.3, DT, DT)
    }

    #[test]
    fn test_raw_chain_ignores_filtered_fields() {
        // Poison the filtered fields; the raw derivatives must not see them
        let mut prev = FilteredPose::at_rest(DVec3::ZERO, DQuat::IDENTITY);
        prev.position = DVec3::splat(1000.0);
        prev.velocity = DVec3::splat(1000.0);

        let next = PoseFilter::step(&prev, DVec3::new(0.1, 0.0, 0.0), DQuat::IDENTITY, &ema(), DT);
        assert_relative_eq!(next.raw_velocity.x, 0.1 / DT, epsilon = 1e-9);
        assert_relative_eq!(next.raw_velocity.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_dt_holds_previous_derivatives() {
        let mut prev = FilteredPose::at_rest(DVec3::ZERO, DQuat::IDENTITY);
        prev.raw_velocity = DVec3::new(3.0, 0.0, 0.0);

        let next = PoseFilter::step(&prev, DVec3::new(5.0, 0.0, 0.0), DQuat::IDENTITY, &ema(), 0.0);
        assert_relative_eq!(next.raw_velocity.x, 3.0, epsilon = 1e-12);
        assert!(next.velocity_magnitude.is_finite());
    }

    #[test]
    fn test_filtered_position_converges_to_constant_raw() {
        let target = DVec3::new(1.0, 2.0, 3.0);
        let mut state = FilteredPose::at_rest(DVec3::ZERO, DQuat::IDENTITY);

        for _ in 0..400 {
            state = PoseFilter::step(&state, target, DQuat::IDENTITY, &ema(), DT);
        }
        assert_relative_eq!(state.position.x, target.x, epsilon = 1e-6);
        assert_relative_eq!(state.position.z, target.z, epsilon = 1e-6);
    }

    #[test]
    fn test_magnitudes_match_vectors() {
        let prev = FilteredPose::at_rest(DVec3::ZERO, DQuat::IDENTITY);
        let next = PoseFilter::step(
            &prev,
            DVec3::new(0.0, 0.3, 0.4),
            DQuat::from_rotation_z(0.01),
            &ema(),
            DT,
        );
        assert_relative_eq!(
            next.raw_velocity_magnitude,
            next.raw_velocity.length(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            next.velocity_magnitude,
            next.velocity.length(),
            epsilon = 1e-12
        );
        assert_relative_eq!(next.raw_velocity_magnitude, 0.5 / DT, epsilon = 1e-9);
    }

    #[test]
    fn test_smoothing_lags_raw_step() {
        let prev = FilteredPose::at_rest(DVec3::ZERO, DQuat::IDENTITY);
        let next = PoseFilter::step(&prev, DVec3::new(1.0, 0.0, 0.0), DQuat::IDENTITY, &ema(), DT);

        // Raw jumps to the sample, the filtered estimate only part-way
        assert_relative_eq!(next.raw_position.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(next.position.x, 0.3, epsilon = 1e-12);
    }
}
