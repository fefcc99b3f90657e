pub mod capture;
pub mod path_lock;
pub mod recorder;
pub mod subtask;
pub mod worker;

pub use capture::{CaptureFormat, CaptureScheduler, FramePixels, FrameSource};
pub use path_lock::PathLockTable;
pub use recorder::RecordScheduler;
pub use subtask::{PersistError, SubtaskTracker};
pub use worker::WriterPool;
