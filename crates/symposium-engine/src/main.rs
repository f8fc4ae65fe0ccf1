//! Engine binary for the Symposium simulation.
//!
//! This is the main entry point that wires configuration, logging, the
//! event stream, and the tokio runtime around a [`Coordinator`], runs the
//! ring once, and turns the verdict into the process exit status.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `symposium-config.yaml` (or the file named
//!    by `SYMPOSIUM_CONFIG`), falling back to defaults
//! 2. Initialize structured logging (tracing) on stderr
//! 3. Build the event sink (stdout console lines, tracing, or both)
//! 4. Build a multi-thread runtime for preemptive scheduling or a
//!    current-thread runtime for cooperative scheduling
//! 5. Run the ring until a verdict or Ctrl-C
//! 6. Exit 0 on success, 2 on starvation, 1 on any error
//!
//! [`Coordinator`]: symposium_core::Coordinator

mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use symposium_core::config::{EventOutput, LogFormat, LoggingConfig};
use symposium_core::events::{ConsoleSink, EventSink, FanoutSink, TracingSink};
use symposium_core::{ConfigError, Coordinator, CoordinatorError, SimulationConfig};
use symposium_types::{RunOutcome, Scheduling};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file looked up in the working directory.
const CONFIG_FILE: &str = "symposium-config.yaml";

/// Environment variable naming an explicit config file.
const ENV_CONFIG_PATH: &str = "SYMPOSIUM_CONFIG";

/// Exit status for a run that ended in starvation.
const EXIT_STARVATION: u8 = 2;

/// Exit status for any error, including an interrupted run.
const EXIT_ERROR: u8 = 1;

/// Application entry point for the engine.
fn main() -> ExitCode {
    let loaded = load_config();

    // Logging needs the config, so a config failure is logged with defaults.
    let logging = loaded
        .as_ref()
        .map(|(config, _)| config.logging.clone())
        .unwrap_or_default();
    init_logging(&logging);

    info!("symposium-engine starting");

    let result = loaded.map_err(EngineError::from).and_then(|(config, source)| {
        match &source {
            Some(path) => info!(path = %path.display(), "Configuration loaded"),
            None => info!("Config file not found, using defaults"),
        }
        run(&config)
    });

    match result {
        Ok(outcome) => exit_code(outcome),
        Err(EngineError::Coordinator {
            source: CoordinatorError::Cancelled,
        }) => {
            warn!("run interrupted before a verdict");
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            error!(error = %e, "symposium-engine failed");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Build the runtime and run the ring once.
fn run(config: &SimulationConfig) -> Result<RunOutcome, EngineError> {
    info!(
        scheduling = %config.scheduling,
        agents = config.ring.agent_count,
        die_timeout_ms = config.ring.die_timeout_ms,
        act_duration_ms = config.ring.act_duration_ms,
        rest_duration_ms = config.ring.rest_duration_ms,
        target = config.ring.target_action_count,
        poll_interval_ms = config.monitor.poll_interval_ms,
        events = ?config.output.events,
        "Run configured"
    );

    let coordinator = Coordinator::new(
        config.ring.clone(),
        config.monitor.clone(),
        build_sink(config.output.events),
    )?;
    let runtime = build_runtime(config)?;
    let cancel = CancellationToken::new();

    let report = runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, cancelling run");
                    interrupt.cancel();
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        });
        coordinator.run(config.scheduling, &cancel).await
    })?;

    info!(
        outcome = %report.outcome,
        started_at = %report.started_at,
        elapsed_ms = report.elapsed_ms,
        action_counts = ?report.action_counts,
        total_actions = report.total_actions(),
        "symposium-engine shutdown complete"
    );

    Ok(report.outcome)
}

/// Load configuration.
///
/// An explicit `SYMPOSIUM_CONFIG` path must exist. Otherwise
/// `symposium-config.yaml` is used if present, and defaults (plus
/// environment overrides) if not. Returns the file that was read, if any.
fn load_config() -> Result<(SimulationConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = std::env::var_os(ENV_CONFIG_PATH) {
        let path = PathBuf::from(path);
        let config = SimulationConfig::from_file(&path)?;
        return Ok((config, Some(path)));
    }

    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        let config = SimulationConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((SimulationConfig::from_env()?, None))
    }
}

/// Initialize the global tracing subscriber on stderr.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Build the event sink for the configured output.
fn build_sink(output: EventOutput) -> Arc<dyn EventSink> {
    match output {
        EventOutput::Console => Arc::new(ConsoleSink::stdout()),
        EventOutput::Tracing => Arc::new(TracingSink),
        EventOutput::Both => Arc::new(FanoutSink::new(vec![
            Arc::new(ConsoleSink::stdout()) as Arc<dyn EventSink>,
            Arc::new(TracingSink),
        ])),
    }
}

/// Build the runtime that matches the scheduling model.
fn build_runtime(config: &SimulationConfig) -> Result<tokio::runtime::Runtime, EngineError> {
    let mut builder = match config.scheduling {
        Scheduling::Preemptive => {
            let mut builder = tokio::runtime::Builder::new_multi_thread();
            if let Some(threads) = config.runtime.worker_threads {
                builder.worker_threads(threads);
            }
            builder
        }
        Scheduling::Cooperative => tokio::runtime::Builder::new_current_thread(),
    };
    Ok(builder.enable_all().build()?)
}

/// Map a verdict to the process exit status.
fn exit_code(outcome: RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Success { .. } => ExitCode::SUCCESS,
        RunOutcome::Starvation { .. } => ExitCode::from(EXIT_STARVATION),
    }
}
