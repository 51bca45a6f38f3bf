//! # EVO Scheduler Daemon
//!
//! Runs the real-time event scheduler against the simulation driver.
//!
//! Loads `scheduler.toml`, wires the exit cascade to termination signals,
//! starts the boot-time PWM channels and enters the RT consumer loop.
//!
//! # Usage
//!
//! ```bash
//! # Default config path, run until Ctrl+C
//! evo_scheduler
//!
//! # Explicit config, verbose, stop after 10 seconds
//! evo_scheduler config/scheduler.toml -v --run-for 10
//! ```

use clap::Parser;
use evo_common::config::{ConfigLoader, SchedulerFileConfig};
use evo_common::consts::DEFAULT_CONFIG_PATH;
use evo_scheduler::driver::{ConsumerStats, SimulationDriver, spawn_consumer};
use evo_scheduler::exit::ExitCascade;
use evo_scheduler::fault::FaultGuard;
use evo_scheduler::scheduler::Scheduler;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Exit level for actions that make outputs safe.
const LEVEL_OUTPUTS: usize = 0;
/// Exit level for reporting.
const LEVEL_REPORT: usize = 1;

/// EVO Scheduler: RT actuation event scheduler
#[derive(Parser, Debug)]
#[command(name = "evo_scheduler")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Real-time actuation event scheduler with fault-safe shutdown")]
struct Args {
    /// Path to scheduler configuration TOML.
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the backpressure capacity.
    #[arg(long)]
    capacity: Option<usize>,

    /// Override the consumer SCHED_FIFO priority.
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Pin the consumer thread to this CPU core.
    #[arg(long)]
    cpu_core: Option<usize>,

    /// Exit normally after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    run_for: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

/// Everything that must stay alive until the process exits.
struct Runtime {
    _guard: FaultGuard,
    _scheduler: Arc<Scheduler>,
}

fn main() {
    let args = Args::parse();
    let config = SchedulerFileConfig::load(&args.config);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level.as_directive())
        .unwrap_or("info");
    setup_tracing(&args, log_level);

    info!("EVO Scheduler v{} starting...", env!("CARGO_PKG_VERSION"));

    let _runtime = match config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|c| run(&args, c))
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    };

    match args.run_for {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => loop {
            std::thread::park();
        },
    }

    info!("Run time elapsed, shutting down");
    // process::exit skips destructors, so the guard is still installed when
    // the atexit hook fires the cascade.
    process::exit(0);
}

fn run(
    args: &Args,
    mut config: SchedulerFileConfig,
) -> Result<Runtime, Box<dyn std::error::Error>> {
    if let Some(capacity) = args.capacity {
        config.scheduler.capacity = capacity;
    }
    if let Some(priority) = args.rt_priority {
        config.rt.priority = priority;
    }
    if args.cpu_core.is_some() {
        config.rt.cpu_core = args.cpu_core;
    }
    config.validate()?;

    info!(
        "Config OK: service={}, capacity={}, axes={}, exit_levels={}, pwm_channels={}",
        config.shared.service_name,
        config.scheduler.capacity,
        config.scheduler.max_axes,
        config.scheduler.exit_levels,
        config.pwm.len(),
    );

    let scheduler = Arc::new(Scheduler::new(&config.scheduler));
    let driver = SimulationDriver::new(config.scheduler.max_axes);
    let stats = Arc::new(ConsumerStats::new());

    // Exit cascade: outputs low first, then report.
    let mut cascade = ExitCascade::new(config.scheduler.exit_levels);
    let outputs = driver.outputs();
    cascade.register(
        move || {
            outputs.all_low();
            info!("All outputs driven low");
        },
        LEVEL_OUTPUTS,
    )?;
    let report = stats.clone();
    cascade.register(
        move || {
            info!(
                "Consumer delivered {} events, lateness avg={}ns max={}ns",
                report.events(),
                report.avg_lateness_ns(),
                report.max_lateness_ns()
            );
        },
        LEVEL_REPORT.min(config.scheduler.exit_levels - 1),
    )?;
    let guard = FaultGuard::install(Arc::new(cascade), &config.fault)?;
    info!("Exit cascade armed");

    for ch in &config.pwm {
        scheduler.schedule_pwm(ch.axis, ch.high_ns, ch.low_ns)?;
        info!(
            "PWM axis {}: high={}ns low={}ns",
            ch.axis, ch.high_ns, ch.low_ns
        );
    }

    spawn_consumer(scheduler.clone(), driver, config.rt, stats)?;
    info!("Consumer thread spawned, scheduler running");

    Ok(Runtime {
        _guard: guard,
        _scheduler: scheduler,
    })
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, config_level: &str) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
