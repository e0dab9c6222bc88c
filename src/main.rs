use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use testflow::cli::{run_check, run_fetch, run_flow, run_push, Cli, Commands};
use testflow::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging goes to stderr so stdout stays clean for step output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    info!(
        systems = config.systems.len(),
        config = %cli.config.display(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Run {
            plan,
            name,
            data,
            correlation_id,
            json,
        } => {
            run_flow(&config, &plan, &name, &data, correlation_id.as_deref(), json).await?;
        }
        Commands::Check { plan } => {
            run_check(&config, &plan)?;
        }
        Commands::Fetch {
            system,
            remote_path,
            local_dir,
        } => {
            run_fetch(&config, &system, &remote_path, &local_dir).await?;
        }
        Commands::Push {
            system,
            local_path,
            remote_path,
        } => {
            run_push(&config, &system, &local_path, &remote_path).await?;
        }
    }

    Ok(())
}
