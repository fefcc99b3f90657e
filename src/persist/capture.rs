//! Frame-capture scheduler
//!
//! Same scheduler shape as the record variant, but the countdown requests an
//! asynchronous pixel readback from the render backend instead of flushing a
//! buffer; the write subtask is spawned when the readback completes, so
//! countdown timing is decoupled from readback latency. Failed readbacks are
//! dropped: no subtask, no retry.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::persist::path_lock::PathLockTable;
use crate::persist::subtask::{write_bytes_locked, PersistError, PersistResult, SubtaskTracker};
use crate::persist::worker::WriterPool;

/// One completed readback: RGBA pixels at the target dimensions
#[derive(Clone, Debug)]
pub struct FramePixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Render-backend seam. Readbacks are asynchronous: `request_readback`
/// starts one, completed frames surface later through `poll_completed`.
/// A failed readback simply never surfaces.
pub trait FrameSource {
    fn request_readback(&mut self);
    fn poll_completed(&mut self) -> Option<FramePixels>;
}

/// Per-scheduler output format choice, consumed by the encoder
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CaptureFormat {
    Lossless,
    Lossy { quality: u8 },
}

impl Default for CaptureFormat {
    fn default() -> Self {
        CaptureFormat::Lossless
    }
}

/// Pixel-to-bytes seam; the on-disk grammar lives behind it
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &FramePixels, format: CaptureFormat) -> Vec<u8>;
    fn extension(&self, format: CaptureFormat) -> &'static str;
}

/// Built-in binary PPM (P6) encoder. Always lossless; engine integrations
/// supply encoders that honor the quality setting.
pub struct PpmEncoder;

impl FrameEncoder for PpmEncoder {
    fn encode(&self, frame: &FramePixels, _format: CaptureFormat) -> Vec<u8> {
        let mut bytes = format!("P6\n{} {}\n255\n", frame.width, frame.height).into_bytes();
        bytes.reserve(frame.rgba.len() / 4 * 3);
        for pixel in frame.rgba.chunks_exact(4) {
            bytes.extend_from_slice(&pixel[..3]);
        }
        bytes
    }

    fn extension(&self, _format: CaptureFormat) -> &'static str {
        "ppm"
    }
}

pub struct CaptureScheduler {
    output_root: PathBuf,
    capture_interval: f64,
    capture_countdown: f64,
    rotation_interval: f64,
    rotation_countdown: f64,
    enabled: bool,
    current_folder: PathBuf,
    /// Elapsed seconds since the current epoch folder began; embedded in
    /// every capture filename
    folder_elapsed: f64,
    epoch: u64,
    next_sequence: u64,
    format: CaptureFormat,
    encoder: Arc<dyn FrameEncoder>,
    tracker: SubtaskTracker,
    locks: Arc<PathLockTable>,
    readbacks_requested: u64,
}

impl CaptureScheduler {
    pub fn new(
        output_root: PathBuf,
        capture_interval: f64,
        rotation_interval: f64,
        format: CaptureFormat,
        encoder: Arc<dyn FrameEncoder>,
        pool: Arc<WriterPool>,
        locks: Arc<PathLockTable>,
    ) -> PersistResult<Self> {
        std::fs::create_dir_all(&output_root).map_err(|source| PersistError::CreateDir {
            path: output_root.clone(),
            source,
        })?;

        let epoch = 0;
        let current_folder = frames_folder(&output_root, epoch);
        Ok(Self {
            output_root,
            capture_interval,
            capture_countdown: capture_interval,
            rotation_interval,
            rotation_countdown: rotation_interval,
            enabled: true,
            current_folder,
            folder_elapsed: 0.0,
            epoch,
            next_sequence: 1,
            format,
            encoder,
            tracker: SubtaskTracker::new(pool),
            locks,
            readbacks_requested: 0,
        })
    }

    /// One trigger-loop pass. `sickness` is the concurrently observed score,
    /// embedded in filenames so frames correlate with telemetry without a
    /// timestamp join.
    pub fn tick(&mut self, dt: f64, sickness: f64, source: &mut dyn FrameSource) {
        self.tracker.pump();
        self.folder_elapsed += dt;

        if !self.enabled {
            return;
        }

        // Completed readbacks first; each one becomes a write subtask
        while let Some(frame) = source.poll_completed() {
            self.on_frame_ready(frame, sickness);
        }

        self.capture_countdown -= dt;
        if self.capture_countdown <= 0.0 {
            self.capture_countdown = self.capture_interval;
            self.readbacks_requested += 1;
            source.request_readback();
        }

        self.rotation_countdown -= dt;
        if self.rotation_countdown <= 0.0 {
            self.rotation_countdown = self.rotation_interval;
            self.rotate();
        }
    }

    /// Spawn the encode-and-write subtask for one completed readback
    fn on_frame_ready(&mut self, frame: FramePixels, sickness: f64) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let name = format!(
            "t{:010.3}s_s{:.3}.{}",
            self.folder_elapsed,
            sickness,
            self.encoder.extension(self.format)
        );
        let path = self.current_folder.join(name);
        let folder = self.current_folder.clone();
        let encoder = self.encoder.clone();
        let format = self.format;
        let locks = self.locks.clone();

        self.tracker.spawn(format!("frame seq {}", sequence), move || {
            // Folder creation is idempotent and belongs on the worker with
            // the rest of the blocking I/O
            std::fs::create_dir_all(&folder).map_err(|source| PersistError::CreateDir {
                path: folder.clone(),
                source,
            })?;
            let bytes = encoder.encode(&frame, format);
            write_bytes_locked(&bytes, &path, sequence, &locks).map(|_| ())
        });
    }

    /// Switch to a fresh epoch subfolder; filename elapsed restarts at zero
    fn rotate(&mut self) {
        self.epoch += 1;
        self.current_folder = frames_folder(&self.output_root, self.epoch);
        self.folder_elapsed = 0.0;
        log::info!(
            "rotated frame captures to {}",
            self.current_folder.display()
        );
    }

    /// Blocking drain, same contract as the record scheduler: idempotent,
    /// no spawning while draining, previous enabled state restored.
    pub fn complete_all_subtasks(&mut self) {
        let was_enabled = self.enabled;
        self.enabled = false;
        self.tracker.drain();
        self.enabled = was_enabled;
    }

    pub fn current_folder(&self) -> &PathBuf {
        &self.current_folder
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight_len()
    }

    pub fn frames_written(&self) -> u64 {
        self.tracker.completed()
    }

    pub fn write_errors(&self) -> u64 {
        self.tracker.write_errors()
    }

    pub fn readbacks_requested(&self) -> u64 {
        self.readbacks_requested
    }
}

fn frames_folder(root: &std::path::Path, epoch: u64) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    root.join(format!("frames_{}_{:04}", stamp, epoch))
}

/// Deterministic render-backend stand-in: completes each readback with a
/// small gradient frame on the next poll. Can be configured to fail every
/// Nth readback to exercise the silent-drop path.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    requested: u64,
    fail_every: Option<u64>,
    pending: VecDeque<FramePixels>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            requested: 0,
            fail_every: None,
            pending: VecDeque::new(),
        }
    }

    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    fn render(&self) -> FramePixels {
        let mut rgba = Vec::with_capacity((self.width * self.height * 4) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                rgba.push((x * 255 / self.width.max(1)) as u8);
                rgba.push((y * 255 / self.height.max(1)) as u8);
                rgba.push((self.requested % 256) as u8);
                rgba.push(255);
            }
        }
        FramePixels {
            width: self.width,
            height: self.height,
            rgba,
        }
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }
}

impl FrameSource for SyntheticFrameSource {
    fn request_readback(&mut self) {
        self.requested += 1;
        let failed = self
            .fail_every
            .is_some_and(|n| n > 0 && self.requested % n == 0);
        if !failed {
            let frame = self.render();
            self.pending.push_back(frame);
        }
    }

    fn poll_completed(&mut self) -> Option<FramePixels> {
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CAPTURE: f64 = 0.1;
    const ROTATE: f64 = 1.0;

    fn scheduler(root: &std::path::Path) -> CaptureScheduler {
        CaptureScheduler::new(
            root.to_path_buf(),
            CAPTURE,
            ROTATE,
            CaptureFormat::Lossless,
            Arc::new(PpmEncoder),
            Arc::new(WriterPool::new(2, 32)),
            Arc::new(PathLockTable::new()),
        )
        .unwrap()
    }

    fn files_in(folder: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(folder)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[test]
    fn test_capture_writes_named_frame() {
        let dir = tempdir().unwrap();
        let mut sched = scheduler(dir.path());
        let mut source = SyntheticFrameSource::new(8, 4);

        sched.tick(CAPTURE + 0.01, 0.25, &mut source); // requests readback
        sched.tick(0.01, 0.25, &mut source); // readback completes, subtask spawns
        sched.complete_all_subtasks();

        let names = files_in(sched.current_folder());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with('t'), "elapsed prefix: {}", names[0]);
        assert!(names[0].contains("_s0.250"), "sickness score: {}", names[0]);
        assert!(names[0].ends_with(".ppm"));
    }

    #[test]
    fn test_failed_readback_dropped_silently() {
        let dir = tempdir().unwrap();
        let mut sched = scheduler(dir.path());
        let mut source = SyntheticFrameSource::new(8, 4).failing_every(1);

        for _ in 0..5 {
            sched.tick(CAPTURE + 0.01, 0.0, &mut source);
        }
        sched.complete_all_subtasks();

        assert_eq!(source.requested(), 5);
        assert_eq!(sched.frames_written(), 0);
        assert!(files_in(sched.current_folder()).is_empty());
    }

    #[test]
    fn test_rotation_switches_folder_and_resets_elapsed() {
        let dir = tempdir().unwrap();
        let mut sched = scheduler(dir.path());
        let first_folder = sched.current_folder().clone();
        let mut source = SyntheticFrameSource::new(8, 4);

        sched.tick(ROTATE + 0.01, 0.0, &mut source);
        let second_folder = sched.current_folder().clone();
        assert_ne!(first_folder, second_folder);

        // Next frame lands in the new folder with elapsed counted from the
        // folder switch, not from session start
        sched.tick(CAPTURE + 0.01, 0.5, &mut source);
        sched.tick(0.01, 0.5, &mut source);
        sched.complete_all_subtasks();

        let names = files_in(&second_folder);
        assert_eq!(names.len(), 2, "both completed frames land in the new folder");
        for name in &names {
            let elapsed: f64 = name[1..11].parse().unwrap();
            assert!(elapsed < ROTATE, "elapsed must restart per epoch: {}", name);
        }
    }

    #[test]
    fn test_ppm_encoder_shape() {
        let frame = FramePixels {
            width: 2,
            height: 1,
            rgba: vec![10, 20, 30, 255, 40, 50, 60, 255],
        };
        let bytes = PpmEncoder.encode(&frame, CaptureFormat::Lossless);
        assert!(bytes.starts_with(b"P6\n2 1\n255\n"));
        assert_eq!(&bytes[bytes.len() - 6..], &[10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_drain_idempotent() {
        let dir = tempdir().unwrap();
        let mut sched = scheduler(dir.path());
        let mut source = SyntheticFrameSource::new(8, 4);

        sched.tick(CAPTURE + 0.01, 0.0, &mut source);
        sched.tick(0.01, 0.0, &mut source);

        sched.complete_all_subtasks();
        assert_eq!(sched.in_flight(), 0);
        let written = sched.frames_written();

        sched.complete_all_subtasks();
        assert_eq!(sched.in_flight(), 0);
        assert_eq!(sched.frames_written(), written);
    }
}
