//! Motescript runner.
//!
//! Replays a recorded feed of mote output through a test plan in the
//! deterministic simulator and reports the verdict.
//!
//! # Usage
//!
//! ```bash
//! # Four-hour TCP run with no mote output (passes on timeout)
//! motescript --plan tcp-fixed-port
//!
//! # Replay a recorded log against the stream plan
//! motescript --plan tcp-stream --feed run.log --seed 7 --log-level debug
//! ```

use std::{error::Error, path::PathBuf, process::ExitCode, time::Duration};

use clap::{Parser, ValueEnum};
use motescript_core::{MessageSource, ScriptDriver, TestPlan};
use motescript_harness::{SimWorld, load_feed};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Built-in plans.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlanArg {
    /// TCP on the fixed MQTT port, four hours
    TcpFixedPort,
    /// TCP streams with a fresh server port per stream, one hour
    TcpStream,
    /// UDP over RPL with one random port pair, one hour
    RplUdp,
    /// UDP over RPL with periodic port resets, two hours
    RplUdpVarying,
}

impl PlanArg {
    fn plan(self) -> TestPlan {
        match self {
            Self::TcpFixedPort => TestPlan::tcp_fixed_port(),
            Self::TcpStream => TestPlan::tcp_stream(),
            Self::RplUdp => TestPlan::rpl_udp(),
            Self::RplUdpVarying => TestPlan::rpl_udp_varying(),
        }
    }
}

/// Motescript test plan runner
#[derive(Parser, Debug)]
#[command(name = "motescript")]
#[command(about = "Run a mote network test plan in a deterministic simulator")]
#[command(version)]
struct Args {
    /// Plan to run
    #[arg(short, long, value_enum, default_value = "rpl-udp")]
    plan: PlanArg,

    /// Simulation seed
    #[arg(short, long, default_value = "12345")]
    seed: u64,

    /// Number of motes (raised to the highest id in the feed)
    #[arg(short, long, default_value = "3")]
    motes: u32,

    /// Override the plan's timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Recorded mote output (time:id:text per line)
    #[arg(short, long)]
    feed: Option<PathBuf>,

    /// Log previous variable values before each write
    #[arg(long)]
    verbose_memory: bool,

    /// Maximum number of delivered events
    #[arg(long)]
    max_events: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut plan = args.plan.plan().with_verbose_memory(args.verbose_memory);
    if let Some(ms) = args.timeout_ms {
        plan = plan.with_timeout(Duration::from_millis(ms));
    }

    let feed = match &args.feed {
        Some(path) => {
            tracing::info!("Loading feed from {}", path.display());
            load_feed(path)?
        },
        None => Vec::new(),
    };

    let highest = feed
        .iter()
        .filter_map(|msg| match msg.source {
            MessageSource::Mote(id) => Some(id),
            MessageSource::Script => None,
        })
        .max()
        .unwrap_or(0);

    let mut world = SimWorld::with_motes(args.seed, args.motes.max(highest));
    for msg in feed {
        world.schedule(msg)?;
    }

    let mut driver = ScriptDriver::for_simulation(plan, &world);
    if let Some(limit) = args.max_events {
        driver = driver.with_event_limit(limit);
    }

    let report = driver.run(&mut world)?;

    tracing::info!(
        events = report.events_delivered,
        broadcasts = report.broadcasts.len(),
        "Finished at {}: {}",
        report.ended_at,
        report.verdict
    );

    Ok(if report.verdict.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
