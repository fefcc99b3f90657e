//! Rate-adaptive exponential smoothing ("continuous EMA")
//!
//! An ordinary EMA assumes samples arrive at a fixed interval; under tick
//! jitter its effective time-constant drifts. Here the smoothing factor is
//! rectified by the elapsed-time ratio so the time-constant stays invariant:
//!
//!   exponent   = t_actual / t_ideal
//!   (1 - a')   = (1 - a)^exponent
//!   filtered   = a' * raw + (1 - a') * filtered_prev
//!
//! When t_actual == t_ideal this reduces exactly to a one-step EMA, and
//! t_actual == k * t_ideal equals k sequential one-step applications.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Smallest elapsed time accepted before rectification, seconds
pub const MIN_TIME_INTERVAL: f64 = 1e-6;

/// Keeps alpha inside the open interval (0, 1)
const ALPHA_MARGIN: f64 = 1e-6;

/// Snapshot of the smoothing parameters applied on one tick.
///
/// Retained inside every record so a session can be re-filtered offline
/// with the exact factors that were live at capture time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ContinuousEmaConfig {
    pub alpha_ideal: f64,
    pub time_interval_ideal: f64,
    pub time_interval_actual: f64,
    pub exponent_rectification: f64,
    pub alpha_actual: f64,
    pub one_minus_alpha_actual: f64,
}

impl ContinuousEmaConfig {
    /// Compute the rectified smoothing factor for this tick.
    ///
    /// `alpha_ideal` is clamped into (0, 1); both intervals are clamped to
    /// a positive epsilon so near-zero tick spacing cannot blow up the
    /// exponent.
    pub fn rectify(alpha_ideal: f64, time_interval_ideal: f64, time_interval_actual: f64) -> Self {
        let alpha_ideal = alpha_ideal.clamp(ALPHA_MARGIN, 1.0 - ALPHA_MARGIN);
        let time_interval_ideal = time_interval_ideal.max(MIN_TIME_INTERVAL);
        let time_interval_actual = time_interval_actual.max(MIN_TIME_INTERVAL);

        let exponent_rectification = time_interval_actual / time_interval_ideal;
        let one_minus_alpha_actual = (1.0 - alpha_ideal).powf(exponent_rectification);
        let alpha_actual = 1.0 - one_minus_alpha_actual;

        Self {
            alpha_ideal,
            time_interval_ideal,
            time_interval_actual,
            exponent_rectification,
            alpha_actual,
            one_minus_alpha_actual,
        }
    }

    /// Smooth a scalar signal
    pub fn blend(&self, raw: f64, filtered_prev: f64) -> f64 {
        self.alpha_actual * raw + self.one_minus_alpha_actual * filtered_prev
    }

    /// Smooth a vector signal component-wise
    pub fn blend_vec3(&self, raw: DVec3, filtered_prev: DVec3) -> DVec3 {
        raw * self.alpha_actual + filtered_prev * self.one_minus_alpha_actual
    }

    /// Smooth an orientation by shortest-arc slerp toward the raw rotation
    pub fn blend_quat(&self, raw: DQuat, filtered_prev: DQuat) -> DQuat {
        filtered_prev.slerp(raw, self.alpha_actual).normalize()
    }
}
