//! Command-line driver for cross-chain validation simulations

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use ccv_core::{CcvConfig, CcvError, ErrorKind, ProtocolParams};
use ccv_simulator::{replay, PolicyKind, Simulator, SimulatorConfig, Trace};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ccv-sim")]
#[command(about = "Explore and replay cross-chain validation schedules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a seeded random simulation and check every invariant
    Run {
        /// Simulator configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Override the number of steps
        #[arg(long)]
        steps: Option<usize>,

        /// Override the scheduling policy
        #[arg(short, long, value_enum)]
        policy: Option<PolicyKind>,

        /// Write the action trace to this file (JSON)
        #[arg(short, long)]
        trace_out: Option<PathBuf>,
    },

    /// Replay a saved trace
    Replay {
        /// Trace file written by `run --trace-out`
        #[arg(short, long)]
        trace: PathBuf,

        /// Simulator configuration whose protocol parameters the trace ran with
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            // bad input is 2, a trace that no longer replays is 3
            match e.downcast_ref::<CcvError>().map(CcvError::kind) {
                Some(ErrorKind::Internal) => ExitCode::from(3),
                _ => ExitCode::from(2),
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Returns whether the run was clean.
fn execute(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Run {
            config,
            seed,
            steps,
            policy,
            trace_out,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(steps) = steps {
                config.max_steps = steps;
            }
            if let Some(policy) = policy {
                config.policy = policy;
            }

            let simulator = Simulator::new(config).context("invalid simulator configuration")?;
            let result = simulator.run()?;

            println!(
                "policy={} seed={} steps={} violations={}",
                simulator.policy().name(),
                result.trace.seed.unwrap_or_default(),
                result.steps_applied,
                result.violations.len()
            );
            for (consumer, status) in &result.final_state.provider_state.consumer_status {
                println!("  {consumer}: {status}");
            }
            for v in &result.violations {
                println!("  step {}: [{}] {}", v.step, v.violation.code(), v.violation);
            }

            if let Some(path) = trace_out {
                result.trace.save(&path)?;
                println!("trace written to {}", path.display());
            }
            Ok(result.is_clean())
        }
        Commands::Replay { trace, config } => {
            let params: ProtocolParams = load_config(config.as_deref())?.protocol;
            let loaded = Trace::load(&trace)?;
            let state = replay(&loaded, &params)
                .with_context(|| format!("replaying {}", trace.display()))?;
            println!(
                "replayed {} actions; provider at {}",
                loaded.len(),
                state.provider_state.chain_state.running_timestamp
            );
            Ok(true)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SimulatorConfig> {
    match path {
        Some(path) => SimulatorConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(SimulatorConfig::default()),
    }
}
