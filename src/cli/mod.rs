//! Command-line interface for running plans directly.

mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use runner::{run_check, run_fetch, run_flow, run_push, ConsoleSink, JsonSink};

/// testflow - remote test automation over pooled SSH sessions
#[derive(Parser)]
#[command(name = "testflow")]
#[command(about = "Runs test plans against remote systems over SSH")]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Validate a plan against the configuration
    testflow --config lab.yaml check plans/smoke.yaml

    # Run a single process or a compound by name
    testflow --config lab.yaml run plans/smoke.yaml restart-app
    testflow --config lab.yaml run plans/smoke.yaml deploy-check --data check_logs=true

    # Move files through the staging policy of the target system
    testflow --config lab.yaml fetch db /var/log/db/trace.log ./captures
    testflow --config lab.yaml push db ./fixtures/seed.sql /tmp/seed.sql")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "testflow.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a process or compound from a plan file
    Run {
        /// Plan file path
        plan: PathBuf,

        /// Process or compound name; compounds take precedence
        name: String,

        /// Flow data entries as KEY=VALUE, may repeat
        #[arg(long = "data", value_name = "KEY=VALUE")]
        data: Vec<String>,

        /// Correlation id stamped on progress updates and log files
        #[arg(long)]
        correlation_id: Option<String>,

        /// Emit each step response as a JSON line instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a plan file against the configuration
    Check {
        /// Plan file path
        plan: PathBuf,
    },

    /// Download a remote file, honoring the system's staging policy
    Fetch {
        /// System id from the configuration
        system: String,

        /// Remote file path
        remote_path: String,

        /// Local directory the file lands in
        #[arg(default_value = ".")]
        local_dir: PathBuf,
    },

    /// Upload a local file, honoring the system's staging policy
    Push {
        /// System id from the configuration
        system: String,

        /// Local file path
        local_path: PathBuf,

        /// Remote destination path
        remote_path: String,
    },
}
