//! FE-FRT Simulator - live microphonics / forward power dashboard
//!
//! Streams a looping microphonics trace through the cavity model and draws
//! the forward power with and without the fast reactive tuner.
//!
//! # Usage
//!
//! ```bash
//! # Synthetic trace, controls from stdin
//! cargo run --release
//!
//! # Recorded trace, no control surface, stop after 30 s
//! cargo run --release -- --dataset detuning.csv --controls none --run-for-secs 30
//!
//! # Scripted controls
//! printf 'cc 39 64\nnote 40 127\n' | ./frt-simulator
//! ```
//!
//! # Environment Variables
//!
//! - `FRT_SIM_CONFIG`: Path to the simulator config TOML
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use frt_simulator::config::defaults::SYNTHETIC_DEFAULT_SEED;
use frt_simulator::config::SimConfig;
use frt_simulator::controls::{
    ControlMap, ControlSurface, InputDriver, NullSurface, StdinSurface, VariableStore,
};
use frt_simulator::feed::{run_render_loop, LogSurface, RenderFeed};
use frt_simulator::pipeline::{self, LoopingSource, PhysicsProducer, Trace};
use frt_simulator::{declare_topics, BusEvent, DerivedCache, EventBus};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "frt-simulator")]
#[command(about = "Microphonics FE-FRT simulator: forward power of an RF cavity under live control")]
#[command(version)]
struct CliArgs {
    /// Simulator config TOML (overrides FRT_SIM_CONFIG and ./simulator_config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Detuning trace CSV with `time` and `detuning` columns
    #[arg(long, value_name = "CSV")]
    dataset: Option<PathBuf>,

    /// Length of the synthetic trace used when no dataset is given
    /// (default: pipeline.window_samples)
    #[arg(long)]
    synthetic_samples: Option<usize>,

    /// Seed of the synthetic trace
    #[arg(long, default_value_t = SYNTHETIC_DEFAULT_SEED)]
    seed: u64,

    /// Control surface to listen on
    #[arg(long, value_enum, default_value_t = ControlsMode::Stdin)]
    controls: ControlsMode,

    /// Stop automatically after this many seconds
    #[arg(long, value_name = "SECS")]
    run_for_secs: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long, env = "FRT_SIM_LOG_JSON")]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ControlsMode {
    /// Line-oriented messages on stdin
    Stdin,
    /// No control surface; controls keep their configured values
    #[value(name = "none")]
    Off,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    InputDriver,
    Producer,
    RenderFeed,
    Render,
    RunTimer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::InputDriver => write!(f, "InputDriver"),
            TaskName::Producer => write!(f, "Producer"),
            TaskName::RenderFeed => write!(f, "RenderFeed"),
            TaskName::Render => write!(f, "Render"),
            TaskName::RunTimer => write!(f, "RunTimer"),
        }
    }
}

// ============================================================================
// Data Loading (CSV / Synthetic)
// ============================================================================

/// Load the detuning trace from CSV, or generate the synthetic one.
fn load_trace(args: &CliArgs, config: &SimConfig) -> Result<Trace> {
    let path = args.dataset.as_ref().or(config.dataset.path.as_ref());
    let mut trace = match path {
        Some(path) => {
            info!("📂 Loading detuning trace from {}", path.display());
            pipeline::load_csv(path)
                .with_context(|| format!("loading detuning trace {}", path.display()))?
        }
        None => {
            let samples = args
                .synthetic_samples
                .unwrap_or(config.pipeline.window_samples);
            info!(samples, seed = args.seed, "📂 No dataset configured, using synthetic trace");
            pipeline::synthetic(samples, args.seed).context("generating synthetic trace")?
        }
    };

    if let Some(offset) = config.pipeline.wrap_offset_secs {
        let measured = trace.pass_duration();
        match trace.set_pass_duration(offset) {
            Ok(()) => info!(measured, configured = offset, "Using configured wrap offset"),
            Err(e) => warn!(measured, "Ignoring pipeline.wrap_offset_secs: {}", e),
        }
    }
    Ok(trace)
}

// ============================================================================
// Supervisor
// ============================================================================

/// Monitor tasks until cancellation or the first failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {:#}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Wait for every remaining task after cancellation.
async fn drain_tasks(task_set: &mut JoinSet<Result<TaskName>>) {
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => info!("🔒 Supervisor: Task {} stopped", task_name),
            Ok(Err(e)) => warn!("🔒 Supervisor: Task failed during shutdown: {:#}", e),
            Err(e) => warn!("🔒 Supervisor: Task panicked during shutdown: {}", e),
        }
    }
}

// ============================================================================
// Simulator
// ============================================================================

async fn run_simulator(args: CliArgs, cancel_token: CancellationToken) -> Result<()> {
    let config = SimConfig::load(args.config.as_deref());
    if config.cavity.is_degenerate() {
        warn!("Cavity constants are zero: powers and loaded Qs will read 0");
    } else {
        info!(
            f0_hz = config.cavity.resonant_frequency_hz,
            vc_v = config.cavity.cavity_voltage_v,
            q0 = config.cavity.intrinsic_q,
            r_over_q = config.cavity.r_over_q_ohm,
            "Cavity"
        );
    }
    let trace = load_trace(&args, &config)?;
    let pipeline_cfg = config.pipeline;

    // Topology: topics first, then every subscriber, then the publishers.
    let bus: Arc<EventBus<BusEvent>> = Arc::new(EventBus::new());
    declare_topics(&bus);

    let store = VariableStore::from_config(&config.controls);
    let cache = DerivedCache::new(
        store.reader(),
        config.cavity,
        Arc::clone(&bus),
        Duration::from_secs_f64(pipeline_cfg.colour_interval_secs),
    )?;

    let (results_tx, results_rx) = mpsc::channel(pipeline_cfg.results_queue_capacity);
    let (feed, frames) = RenderFeed::new(
        results_rx,
        store.reader(),
        &bus,
        pipeline_cfg.batch_size,
        pipeline_cfg.window_samples,
    )?;

    let source = LoopingSource::new(trace, pipeline_cfg.sample_delay_ms);
    let producer = PhysicsProducer::new(
        source,
        cache,
        config.cavity,
        pipeline_cfg.detuning_offset,
        None,
        results_tx,
    );

    let surface: Box<dyn ControlSurface> = match args.controls {
        ControlsMode::Stdin => {
            info!("📥 Controls: stdin (`cc <n> <v>`, `note <n> <v>`, `set <name> <value>`)");
            Box::new(StdinSurface::new())
        }
        ControlsMode::Off => {
            info!("📥 Controls: none");
            Box::new(NullSurface)
        }
    };
    let driver = InputDriver::new(surface, store, Arc::clone(&bus), ControlMap::default());

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let cancel = cancel_token.clone();
    task_set.spawn(async move {
        feed.run(cancel).await?;
        Ok(TaskName::RenderFeed)
    });

    let cancel = cancel_token.clone();
    task_set.spawn(async move {
        producer.run(cancel).await?;
        Ok(TaskName::Producer)
    });

    let cancel = cancel_token.clone();
    task_set.spawn(async move {
        driver.run(cancel).await?;
        Ok(TaskName::InputDriver)
    });

    let cancel = cancel_token.clone();
    let render_interval = Duration::from_millis(pipeline_cfg.render_interval_ms);
    task_set.spawn(async move {
        run_render_loop(LogSurface, frames, render_interval, cancel).await?;
        Ok(TaskName::Render)
    });

    if let Some(secs) = args.run_for_secs {
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("⏱️  Run time of {}s elapsed, shutting down", secs);
                    cancel.cancel();
                }
            }
            Ok(TaskName::RunTimer)
        });
    }

    let outcome = run_supervisor(&mut task_set, cancel_token.clone()).await;
    cancel_token.cancel();
    drain_tasks(&mut task_set).await;
    outcome
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let result = runtime.block_on(async move {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("  FE-FRT Simulator - microphonics vs. forward power");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        // Graceful shutdown via Ctrl+C
        let cancel_token = CancellationToken::new();
        let shutdown_token = cancel_token.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("🛑 Received Ctrl+C, initiating shutdown...");
            shutdown_token.cancel();
        });

        run_simulator(args, cancel_token).await
    });

    // A stdin read parked on the blocking pool must not hold up exit.
    runtime.shutdown_timeout(Duration::from_millis(250));
    println!("Program stopped.");
    result
}
