//! CLI runner functions, reusing the orchestration and transfer layers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{load_plan, Config, Plan};
use crate::domain::FlowData;
use crate::error::{FlowError, Result};
use crate::exec::Orchestrator;
use crate::ports::{CommandExecutor, ProgressSink, ProgressUpdate};
use crate::ssh::SshExecutor;

/// Prints each step result to stdout as it completes.
pub struct ConsoleSink;

#[async_trait]
impl ProgressSink for ConsoleSink {
    async fn publish(&self, update: ProgressUpdate) {
        let response = &update.response;
        if response.skipped {
            println!("[{}] {} SKIPPED", update.step_index + 1, response.name);
            return;
        }
        println!(
            "[{}] {} {} ({} ms)",
            update.step_index + 1,
            response.name,
            response.status,
            response.duration_ms
        );
        for error in &response.errors {
            println!("    error: {error}");
        }
        for line in &response.display_output {
            println!("    | {line}");
        }
        if let Some(path) = &response.log_path {
            println!("    log: {}", path.display());
        }
        for file in &response.extracted_files {
            println!("    extracted: {file}");
        }
    }
}

/// Emits each step response as one JSON object per line on stdout.
pub struct JsonSink;

#[async_trait]
impl ProgressSink for JsonSink {
    async fn publish(&self, update: ProgressUpdate) {
        match serde_json::to_string(&update.response) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "cannot serialize step response"),
        }
    }
}

/// Validates a plan file against the configuration: structure, regex
/// patterns, and that every referenced system exists.
pub fn run_check(config: &Config, plan_path: &Path) -> Result<()> {
    let plan = load_plan(plan_path)?;
    check_systems(config, &plan)?;
    println!(
        "plan ok: {} processes, {} compounds, {} systems configured",
        plan.processes.len(),
        plan.compounds.len(),
        config.systems.len()
    );
    Ok(())
}

fn check_systems(config: &Config, plan: &Plan) -> Result<()> {
    for process in &plan.processes {
        if !config.systems.contains_key(&process.system) {
            return Err(FlowError::UnknownSystem {
                system: process.system.clone(),
            });
        }
    }
    Ok(())
}

/// Runs a compound or process by name and prints each step as it
/// finishes. Fails when any executed step failed.
pub async fn run_flow(
    config: &Config,
    plan_path: &Path,
    name: &str,
    data: &[String],
    correlation_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let plan = load_plan(plan_path)?;
    check_systems(config, &plan)?;

    let mut flow = FlowData::from_pairs(data)?;
    let generated;
    let correlation_id = match correlation_id {
        Some(id) => id,
        None => {
            generated = uuid::Uuid::new_v4().simple().to_string();
            &generated
        }
    };

    let executor: Arc<dyn CommandExecutor> = Arc::new(SshExecutor::new(config));
    let sink: Arc<dyn ProgressSink> = if json {
        Arc::new(JsonSink)
    } else {
        Arc::new(ConsoleSink)
    };
    let orchestrator = Orchestrator::new(executor, sink, config);

    info!(name = %name, correlation_id = %correlation_id, "starting run");

    let failed = if let Some(compound) = plan.compound(name) {
        let responses = orchestrator
            .run_compound(compound, &plan, &mut flow, correlation_id)
            .await?;
        responses.iter().filter(|r| r.failed()).count()
    } else if let Some(process) = plan.process(name) {
        let response = orchestrator
            .run_process(process, &mut flow, correlation_id)
            .await;
        usize::from(response.failed())
    } else {
        return Err(FlowError::Config(format!(
            "no process or compound named '{name}' in {}",
            plan_path.display()
        )));
    };

    if failed > 0 {
        return Err(FlowError::Step {
            reason: format!("{failed} step(s) failed"),
        });
    }
    Ok(())
}

/// Downloads one remote file into a local directory.
pub async fn run_fetch(
    config: &Config,
    system: &str,
    remote_path: &str,
    local_dir: &Path,
) -> Result<()> {
    let executor = SshExecutor::new(config);
    let local = executor.fetch_file(system, remote_path, local_dir).await?;
    println!("fetched {remote_path} -> {}", local.display());
    Ok(())
}

/// Uploads one local file to a remote path.
pub async fn run_push(
    config: &Config,
    system: &str,
    local_path: &Path,
    remote_path: &str,
) -> Result<()> {
    let executor = SshExecutor::new(config);
    executor.push_file(system, local_path, remote_path).await?;
    println!("pushed {} -> {remote_path}", local_path.display());
    Ok(())
}
