use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};

use vr_telemetry_rs::config::TelemetryConfig;
use vr_telemetry_rs::persist::capture::{PpmEncoder, SyntheticFrameSource};
use vr_telemetry_rs::persist::{CaptureScheduler, PathLockTable, RecordScheduler, WriterPool};
use vr_telemetry_rs::sampler::TelemetrySampler;
use vr_telemetry_rs::sensors::SyntheticRig;
use vr_telemetry_rs::status::LiveStatus;

#[derive(Parser, Debug)]
#[command(name = "vr_telemetry")]
#[command(about = "VR telemetry sampler - continuous EMA filtering with background persistence", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Output directory
    #[arg(long, default_value = "vr_telemetry_sessions")]
    output_dir: String,

    /// JSON config file; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host tick rate in Hz
    #[arg(long)]
    tick_hz: Option<f64>,

    /// Ideal smoothing factor in (0,1)
    #[arg(long)]
    alpha: Option<f64>,

    /// Disable frame captures
    #[arg(long)]
    no_capture: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TelemetryConfig::load(path)?,
        None => TelemetryConfig::default(),
    };
    config.output_dir = args.output_dir.clone();
    if let Some(hz) = args.tick_hz {
        config.tick_interval_ideal = 1.0 / hz.max(1.0);
    }
    if let Some(alpha) = args.alpha {
        config.smoothing_alpha_ideal = alpha;
    }
    let config = config.validated();

    let session_id = format!("session_{}", Utc::now().timestamp_millis());
    log::info!(
        "starting {} at {:.0} Hz, flush {}s, rotate {}s, output {}",
        session_id,
        1.0 / config.tick_interval_ideal,
        config.record_flush_interval,
        config.rotation_interval,
        config.output_dir
    );

    let output_dir = PathBuf::from(&config.output_dir);
    let pool = Arc::new(WriterPool::new(config.worker_threads, config.queue_depth));
    let locks = Arc::new(PathLockTable::new());

    let mut records = RecordScheduler::new(
        output_dir.clone(),
        &session_id,
        config.record_flush_interval,
        config.rotation_interval,
        pool.clone(),
        locks.clone(),
    )?;

    let mut captures = if args.no_capture {
        None
    } else {
        Some(CaptureScheduler::new(
            output_dir.join("frames"),
            config.capture_interval,
            config.rotation_interval,
            config.capture_format,
            Arc::new(PpmEncoder),
            pool.clone(),
            locks.clone(),
        )?)
    };

    let mut sampler = TelemetrySampler::new(
        config.smoothing_alpha_ideal,
        config.tick_interval_ideal,
    );
    let mut rig = SyntheticRig::new();
    let mut frame_source = SyntheticFrameSource::new(320, 180);

    let mut ticker = interval(Duration::from_secs_f64(config.tick_interval_ideal));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let start = Instant::now();
    let mut last_tick = Instant::now();
    let mut last_status = Instant::now();
    let status_path = format!("{}/live_status.json", config.output_dir);

    log::info!("sampling loop running, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("ctrl-c received, draining");
                break;
            }
        }

        if args.duration > 0 && start.elapsed().as_secs() >= args.duration {
            log::info!("duration reached, draining");
            break;
        }

        // Actual elapsed time feeds the rate-adaptive filter, not the ideal
        let dt = last_tick.elapsed().as_secs_f64();
        last_tick = Instant::now();

        let raw = rig.sample(dt);
        sampler.tick(&raw, dt, records.buffer_mut());
        records.tick(dt);
        if let Some(captures) = captures.as_mut() {
            captures.tick(dt, raw.sickness.score, &mut frame_source);
        }

        if last_status.elapsed().as_secs() >= 2 {
            let mut status = LiveStatus::new();
            status.uptime_seconds = start.elapsed().as_secs();
            status.ticks = rig.tick_count();
            status.records_pending = records.pending_records();
            status.record_flushes_spawned = records.flushes_spawned();
            status.record_flushes_completed = records.flushes_completed();
            status.record_rotations = records.rotations();
            status.record_write_errors = records.write_errors();
            status.record_in_flight = records.in_flight();
            if let Some(captures) = captures.as_ref() {
                status.readbacks_requested = captures.readbacks_requested();
                status.frames_written = captures.frames_written();
                status.frame_write_errors = captures.write_errors();
                status.frame_in_flight = captures.in_flight();
            }
            status.head_tracked = raw.head.is_some();
            status.left_hand_tracked = raw.left_hand.is_some();
            status.right_hand_tracked = raw.right_hand.is_some();
            status.gaze_tracked = raw.gaze.is_some();
            status.face_tracked = raw.expression.is_some();
            status.sickness_score = raw.sickness.score;
            if let Err(err) = status.save(&status_path) {
                log::warn!("failed to save live status: {}", err);
            }
            last_status = Instant::now();
        }
    }

    // Final flush, then block until every background write lands
    records.flush_now();
    records.complete_all_subtasks();
    if let Some(captures) = captures.as_mut() {
        captures.complete_all_subtasks();
    }

    println!("\n=== Final Stats ===");
    println!("Ticks: {}", rig.tick_count());
    println!(
        "Record flushes: {} spawned, {} completed, {} errors",
        records.flushes_spawned(),
        records.flushes_completed(),
        records.write_errors()
    );
    println!("Rotations: {}", records.rotations());
    if let Some(captures) = captures.as_ref() {
        println!(
            "Frames: {} requested, {} written, {} errors",
            captures.readbacks_requested(),
            captures.frames_written(),
            captures.write_errors()
        );
    }
    println!("Session file: {}", records.current_path().display());

    Ok(())
}
