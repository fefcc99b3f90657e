pub mod derivative;
pub mod ema;

pub use derivative::{angular_acceleration, angular_velocity, linear_acceleration, linear_velocity};
pub use ema::ContinuousEmaConfig;
