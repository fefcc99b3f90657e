//! Offline re-filtering of a recorded session
//!
//! Loads a rotated records file, replays the continuous-EMA chain over the
//! stored raw head signal with optionally overridden parameters, and reports
//! how far the replayed filtered positions deviate from the ones recorded
//! live. Useful for tuning alpha without re-running a session.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use vr_telemetry_rs::filters::ema::ContinuousEmaConfig;
use vr_telemetry_rs::record::RecordBuffer;

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Re-run the smoothing chain over a recorded session", long_about = None)]
struct Args {
    /// Path to a records_*.json session file
    #[arg(long)]
    log: PathBuf,

    /// Override the ideal smoothing factor; defaults to each record's stored value
    #[arg(long)]
    alpha: Option<f64>,

    /// Override the ideal tick interval in seconds
    #[arg(long)]
    tick_interval: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let text = std::fs::read_to_string(&args.log)
        .with_context(|| format!("failed to read {}", args.log.display()))?;
    let buffer: RecordBuffer =
        serde_json::from_str(&text).with_context(|| "failed to parse session file")?;

    println!(
        "Session {} ({} records, created {})",
        buffer.session_id,
        buffer.len(),
        buffer.created_at
    );

    let head_records: Vec<_> = buffer
        .records
        .iter()
        .filter_map(|r| r.head.as_ref().map(|head| (r.timestamps, r.ema, head)))
        .collect();
    if head_records.len() < 2 {
        bail!("session holds fewer than two head samples, nothing to replay");
    }

    let mut replayed = head_records[0].2.raw_position;
    let mut sum_sq = 0.0;
    let mut max_dev: f64 = 0.0;
    let mut count = 0usize;

    for (timestamps, stored_ema, head) in head_records.iter().skip(1) {
        let alpha = args.alpha.unwrap_or(stored_ema.alpha_ideal);
        let tick_interval = args
            .tick_interval
            .unwrap_or(stored_ema.time_interval_ideal);
        let ema = ContinuousEmaConfig::rectify(alpha, tick_interval, timestamps.delta_seconds);

        replayed = ema.blend_vec3(head.raw_position, replayed);

        let deviation = (replayed - head.position).length();
        sum_sq += deviation * deviation;
        max_dev = max_dev.max(deviation);
        count += 1;
    }

    let rms = (sum_sq / count as f64).sqrt();
    println!("Replayed {} steps", count);
    match args.alpha {
        Some(alpha) => println!("Alpha override: {:.3}", alpha),
        None => println!("Alpha: stored per-record values"),
    }
    println!("RMS deviation from recorded filtered positions: {:.6} m", rms);
    println!("Max deviation: {:.6} m", max_dev);

    Ok(())
}
