//! DevWorkspace load test CLI
//!
//! Ramps virtual users that create, wait for and delete DevWorkspaces,
//! samples the controller's resource usage, and fails with exit code 99
//! when a threshold is violated.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cleanup, run, stages};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// DevWorkspace load test
///
/// Connection and load settings are read from the environment
/// (KUBE_API, KUBE_TOKEN, MAX_VUS, TEST_DURATION_IN_MINUTES, ...).
#[derive(Parser)]
#[command(name = "dw-loadtest")]
#[command(author, version, about = "Load test for the DevWorkspace controller", long_about = None)]
pub struct Cli {
    /// Output format for the summary
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the load test
    Run {
        /// Write the summary as JSON to this file
        #[arg(long, short)]
        report: Option<PathBuf>,

        /// Serve Prometheus metrics on this port while the test runs
        #[arg(long, env = "METRICS_PORT")]
        metrics_port: Option<u16>,
    },

    /// Print the ramp stages for a duration and peak VU count
    Stages {
        /// Total test duration in minutes
        #[arg(long, env = "TEST_DURATION_IN_MINUTES", default_value_t = 25)]
        duration_minutes: u64,

        /// Peak number of virtual users
        #[arg(long, env = "MAX_VUS", default_value_t = 50)]
        max_vus: u32,
    },

    /// Delete everything a previous run left behind
    Cleanup,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            report,
            metrics_port,
        } => {
            init_tracing(cli.log_json);
            let code = run::run_load_test(report, metrics_port, cli.format).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Stages {
            duration_minutes,
            max_vus,
        } => {
            stages::show_stages(duration_minutes, max_vus, cli.format)?;
        }
        Commands::Cleanup => {
            init_tracing(cli.log_json);
            cleanup::cleanup_resources().await?;
        }
    }

    Ok(())
}
