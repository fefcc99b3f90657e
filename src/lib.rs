pub mod config;
pub mod filters;
pub mod persist;
pub mod pose;
pub mod record;
pub mod sampler;
pub mod sensors;
pub mod status;
pub mod types;

pub use config::TelemetryConfig;
pub use pose::{FilteredPose, PoseFilter};
pub use record::{RecordBuffer, RecordDoubleBuffer, TelemetryRecord};
