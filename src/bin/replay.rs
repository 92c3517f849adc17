use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use step_sync::{
    DetectorConfig, ReplaySource, SessionMetadata, StepOrigin, StepRecord, TrackingSession,
};

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay a recorded accelerometer log through the step detector", long_about = None)]
struct Args {
    /// Path to a sample log (*.json or *.json.gz)
    #[arg(long)]
    log: PathBuf,

    /// Detector config (JSON); defaults are used for missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the summary and step events to this JSON file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct ReplayOutput {
    summary: ReplaySummary,
    steps: Vec<StepRecord>,
}

#[derive(Serialize)]
struct ReplaySummary {
    session: SessionMetadata,
    duration_ms: f64,
    cadence_spm: f64,
    mean_confidence: f64,
}

fn summarize(session: SessionMetadata, steps: &[StepRecord]) -> ReplaySummary {
    let detected: Vec<_> = steps
        .iter()
        .filter_map(|r| match r.origin {
            StepOrigin::Detected(event) => Some(event),
            StepOrigin::Manual => None,
        })
        .collect();

    let duration_ms = match (detected.first(), detected.last()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => 0.0,
    };
    let cadence_spm = if duration_ms > 0.0 {
        (detected.len() - 1) as f64 / (duration_ms / 60_000.0)
    } else {
        0.0
    };
    let mean_confidence = if detected.is_empty() {
        0.0
    } else {
        detected.iter().map(|e| e.confidence).sum::<f64>() / detected.len() as f64
    };

    ReplaySummary {
        session,
        duration_ms,
        cadence_spm,
        mean_confidence,
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DetectorConfig::default(),
    };

    let mut source = ReplaySource::from_log(&args.log)
        .with_context(|| format!("loading log {}", args.log.display()))?;
    let mut session = TrackingSession::new(config)?;

    let steps: Arc<Mutex<Vec<StepRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_steps = Arc::clone(&steps);
    session.add_sink(move |record: &StepRecord| {
        if let Ok(mut steps) = sink_steps.lock() {
            steps.push(*record);
        }
    });

    let mode = session.start(&mut source)?;
    log::info!("Replaying {} samples ({:?} input)", source.remaining(), mode);
    session.pump(&mut source)?;
    session.stop()?;

    let steps = steps
        .lock()
        .map_err(|_| anyhow::anyhow!("step sink lock poisoned"))?
        .clone();
    let summary = summarize(session.metadata(), &steps);

    println!("\n=== Replay Summary ===");
    println!("Samples processed: {}", summary.session.samples_processed);
    println!("Samples rejected:  {}", summary.session.samples_rejected);
    println!("Steps detected:    {}", summary.session.detected_steps);
    println!("Cadence:           {:.1} steps/min", summary.cadence_spm);
    println!("Mean confidence:   {:.2}", summary.mean_confidence);

    if let Some(path) = &args.output {
        let output = ReplayOutput { summary, steps };
        let json = serde_json::to_string_pretty(&output)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote replay output to {}", path.display());
    }

    Ok(())
}
