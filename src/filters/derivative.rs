//! Finite-difference derivative estimators for position and orientation
//!
//! Orientation rates come from the shortest-path quaternion delta, never
//! from naive per-axis subtraction: an angle wrapping 179° → −179° must
//! yield a small rate, not one corresponding to a ~358° swing. Degenerate
//! timing or non-finite input yields `None` so callers hold the previous
//! value instead of propagating NaN.

use glam::{DQuat, DVec3, EulerRot};

/// Below this elapsed time a derivative is meaningless
pub const MIN_DELTA_TIME: f64 = 1e-6;

/// Wrap an angle in degrees into (−180°, 180°]
pub fn wrap_angle_deg(degrees: f64) -> f64 {
    let mut wrapped = (degrees + 180.0) % 360.0;
    if wrapped <= 0.0 {
        wrapped += 360.0;
    }
    wrapped - 180.0
}

fn finite_vec3(v: DVec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Linear velocity from successive positions, m/s
pub fn linear_velocity(prev_position: DVec3, position: DVec3, dt: f64) -> Option<DVec3> {
    if dt < MIN_DELTA_TIME || !finite_vec3(prev_position) || !finite_vec3(position) {
        return None;
    }
    let velocity = (position - prev_position) / dt;
    finite_vec3(velocity).then_some(velocity)
}

/// Linear acceleration from successive velocities, m/s²
pub fn linear_acceleration(prev_velocity: DVec3, velocity: DVec3, dt: f64) -> Option<DVec3> {
    // Same finite-difference as velocity, one derivative up
    linear_velocity(prev_velocity, velocity, dt)
}

/// Per-axis angular velocity in deg/s from the shortest-path delta between
/// successive orientations.
pub fn angular_velocity(prev_rotation: DQuat, rotation: DQuat, dt: f64) -> Option<DVec3> {
    if dt < MIN_DELTA_TIME || !prev_rotation.is_finite() || !rotation.is_finite() {
        return None;
    }

    let mut delta = prev_rotation.inverse() * rotation;
    // Both q and -q encode the same rotation; pick the short arc
    if delta.w < 0.0 {
        delta = -delta;
    }

    let (y, x, z) = delta.normalize().to_euler(EulerRot::YXZ);
    let per_axis = DVec3::new(
        wrap_angle_deg(x.to_degrees()),
        wrap_angle_deg(y.to_degrees()),
        wrap_angle_deg(z.to_degrees()),
    ) / dt;

    finite_vec3(per_axis).then_some(per_axis)
}

/// Per-axis angular acceleration in deg/s² from successive angular
/// velocities, wrapping the rate delta the same way as the angle delta.
pub fn angular_acceleration(
    prev_angular_velocity: DVec3,
    angular_velocity: DVec3,
    dt: f64,
) -> Option<DVec3> {
    if dt < MIN_DELTA_TIME
        || !finite_vec3(prev_angular_velocity)
        || !finite_vec3(angular_velocity)
    {
        return None;
    }
    let delta = angular_velocity - prev_angular_velocity;
    let accel = DVec3::new(
        wrap_angle_deg(delta.x),
        wrap_angle_deg(delta.y),
        wrap_angle_deg(delta.z),
    ) / dt;
    finite_vec3(accel).then_some(accel)
}
