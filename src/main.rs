#![forbid(unsafe_code)]

//! `pipeline-progress`: drive a simulated document processing run through
//! the tracker and stream its events as JSON lines on stdout.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pipeline_progress::models::error::ProcessingError;
use pipeline_progress::models::estimation::ImageMetadata;
use pipeline_progress::models::stage::Stage;
use pipeline_progress::{AppError, CancelOutcome, Result, SessionManager, TrackerConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "pipeline-progress",
    about = "Simulate a tracked document processing run",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML tracker configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Session identifier; a random UUID when omitted.
    #[arg(long)]
    session_id: Option<String>,

    /// Image size in bytes.
    #[arg(long, default_value_t = 2_000_000)]
    size: u64,

    /// Image width in pixels.
    #[arg(long, default_value_t = 1200)]
    width: u32,

    /// Image height in pixels.
    #[arg(long, default_value_t = 900)]
    height: u32,

    /// Image MIME type.
    #[arg(long, default_value = "image/jpeg")]
    format: String,

    /// Explicit complexity score in [0, 1].
    #[arg(long)]
    complexity: Option<f64>,

    /// Progress reports per stage.
    #[arg(long, default_value_t = 4)]
    steps: u32,

    /// Multiplier applied to each stage's expected duration.
    #[arg(long, default_value_t = 0.1)]
    time_scale: f64,

    /// Report a non-recoverable failure halfway through this stage.
    #[arg(long, value_parser = parse_stage)]
    fail_at: Option<Stage>,

    /// Request cancellation once this stage starts.
    #[arg(long, value_parser = parse_stage)]
    cancel_at: Option<Stage>,
}

fn parse_stage(raw: &str) -> std::result::Result<Stage, String> {
    Stage::from_str(raw).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => TrackerConfig::load_from_path(path)?,
        None => TrackerConfig::default(),
    };
    let manager = SessionManager::new(config)?;
    let mut events = manager.subscribe();

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(session_id = event.session_id(), %err, "failed to encode event"),
            }
        }
    });

    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut metadata = ImageMetadata::new(args.size, args.width, args.height, args.format.clone());
    if let Some(score) = args.complexity {
        metadata = metadata.with_complexity(score);
    }

    manager.start_session(&session_id, Some(metadata));
    drive(&manager, &session_id, &args).await;

    if let Some(session) = manager.get_session(&session_id) {
        info!(
            session_id = %session_id,
            status = ?session.status,
            overall = session.progress.overall_progress,
            errors = session.errors.len(),
            "run finished"
        );
    }

    manager.shutdown();
    drop(manager);
    printer
        .await
        .map_err(|err| AppError::Io(format!("event printer panicked: {err}")))?;
    Ok(())
}

/// Walk the working stages the way a real pipeline driver would.
async fn drive(manager: &SessionManager, session_id: &str, args: &Cli) {
    let steps = args.steps.max(1);

    for stage in Stage::WORKING {
        manager.update_stage(session_id, stage, 0.0);

        if args.cancel_at == Some(stage) {
            match manager.cancel_session(session_id) {
                CancelOutcome::Cancelled => return,
                CancelOutcome::Rejected => warn!(%stage, "cancellation rejected, continuing"),
                CancelOutcome::NotActive => return,
            }
        }

        let step_delay = step_delay(manager, stage, steps, args.time_scale);
        for step in 1..=steps {
            tokio::time::sleep(step_delay).await;
            if args.fail_at == Some(stage) && step * 2 >= steps {
                manager.handle_error(
                    session_id,
                    ProcessingError::processing(
                        "SIMULATED_FAILURE",
                        format!("simulated failure during {stage}"),
                        false,
                    ),
                );
                return;
            }
            manager.update_stage_progress(session_id, f64::from(step) * 100.0 / f64::from(steps));
        }
    }

    manager.update_stage(session_id, Stage::Completed, 100.0);
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn step_delay(manager: &SessionManager, stage: Stage, steps: u32, time_scale: f64) -> Duration {
    let expected = manager
        .registry()
        .stage_info(stage)
        .map_or(0, |info| info.expected_duration_ms);
    let scaled = (expected as f64 * time_scale.max(0.0) / f64::from(steps)).round() as u64;
    Duration::from_millis(scaled)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
