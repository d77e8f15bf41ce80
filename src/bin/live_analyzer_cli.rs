use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use live_analyzer::config::AnalyzerConfig;
use live_analyzer::engine::{
    CaptureLoop, CaptureSource, ErrorEvent, FeatureEvent, MetricsEvent, Severity,
    SyntheticSource, WavSource,
};
use live_analyzer::error::{CaptureErrorCodes, ErrorCode};
use serde::Serialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "live_analyzer_cli",
    about = "Run the live analysis pipeline against a synthetic tone or a WAV file"
)]
struct Cli {
    /// JSON configuration file (missing or invalid files fall back to defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record and print every published event as one JSON line
    Run {
        /// Mono WAV file to play back instead of the synthetic tone
        #[arg(long, conflicts_with = "tone_hz")]
        wav: Option<PathBuf>,
        #[arg(long, default_value_t = 440.0)]
        tone_hz: f32,
        /// White noise level added to the synthetic tone
        #[arg(long, default_value_t = 0.0)]
        noise: f32,
        #[arg(long, default_value_t = 0x5A5A_FFF0)]
        seed: u64,
        /// Stop the synthetic source after this many frames
        #[arg(long)]
        frames: Option<u64>,
        /// Stop recording after this long
        #[arg(long)]
        duration_ms: Option<u64>,
        /// Override capture.update_interval_ms
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Print the effective configuration
    PrintConfig,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Output {
    Features(FeatureEvent),
    Metrics(MetricsEvent),
    Error(ErrorEvent),
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::load_from_file(path),
        None => AnalyzerConfig::default(),
    };

    match cli.command {
        Commands::PrintConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
        Commands::Run {
            wav,
            tone_hz,
            noise,
            seed,
            frames,
            duration_ms,
            interval_ms,
        } => {
            if let Some(interval_ms) = interval_ms {
                config.capture.update_interval_ms = interval_ms;
            }
            config.validate().context("invalid configuration")?;

            let source: Box<dyn CaptureSource> = match wav {
                Some(path) => Box::new(
                    WavSource::open(&path)
                        .with_context(|| format!("opening {}", path.display()))?,
                ),
                None => {
                    let mut source = SyntheticSource::new(tone_hz).with_noise(noise, seed);
                    if let Some(frames) = frames {
                        source = source.with_frame_limit(frames);
                    }
                    Box::new(source)
                }
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;
            runtime.block_on(run_pipeline(
                config,
                source,
                duration_ms.map(Duration::from_millis),
            ))
        }
    }
}

async fn run_pipeline(
    config: AnalyzerConfig,
    source: Box<dyn CaptureSource>,
    duration: Option<Duration>,
) -> Result<ExitCode> {
    let capture = CaptureLoop::from_config(&config, source);
    let mut events = subscribe_all(&capture)?;

    capture
        .start_recording()
        .context("starting recording")?;

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut exit = ExitCode::from(0);
    loop {
        tokio::select! {
            Some(output) = events.next() => {
                let fatal = fatal_exit(&output);
                emit(&output)?;
                if let Some(code) = fatal {
                    exit = code;
                    break;
                }
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    capture.shutdown().await;

    // Channels are closed; flush whatever was already published.
    while let Some(output) = events.next().await {
        emit(&output)?;
    }

    Ok(exit)
}

fn subscribe_all(capture: &CaptureLoop) -> Result<impl Stream<Item = Output> + Unpin> {
    let features = capture
        .subscribe_features()
        .context("features channel closed")?;
    let metrics = capture
        .subscribe_metrics()
        .context("metrics channel closed")?;
    let errors = capture.subscribe_errors().context("error channel closed")?;

    let features = BroadcastStream::new(features)
        .filter_map(|item| received("features", item).map(Output::Features));
    let metrics = BroadcastStream::new(metrics)
        .filter_map(|item| received("metrics", item).map(Output::Metrics));
    let errors = BroadcastStream::new(errors)
        .filter_map(|item| received("errors", item).map(Output::Error));

    Ok(features.merge(metrics).merge(errors))
}

/// Unwrap one broadcast item; a lagged receiver is logged and skipped.
fn received<T>(channel: &'static str, item: Result<T, BroadcastStreamRecvError>) -> Option<T> {
    match item {
        Ok(event) => Some(event),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(channel, skipped, "Output fell behind, events dropped");
            None
        }
    }
}

/// Exit code for a fatal error event; an exhausted source is a clean end.
fn fatal_exit(output: &Output) -> Option<ExitCode> {
    match output {
        Output::Error(event) if event.severity == Severity::Fatal => {
            if event.error.code() == CaptureErrorCodes::SOURCE_EXHAUSTED {
                Some(ExitCode::from(0))
            } else {
                Some(ExitCode::from(2))
            }
        }
        _ => None,
    }
}

fn emit(output: &Output) -> Result<()> {
    println!("{}", serde_json::to_string(output)?);
    Ok(())
}
