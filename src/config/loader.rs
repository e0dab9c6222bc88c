use std::path::Path;

use tracing::{debug, info};

use crate::config::{Config, Plan};
use crate::error::{FlowError, Result};

/// Loads and validates the engine configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<Config> {
    debug!(path = %path.display(), "loading configuration");
    let text = std::fs::read_to_string(path).map_err(|e| {
        FlowError::Config(format!("cannot read config file {}: {e}", path.display()))
    })?;
    let config: Config = serde_saphyr::from_str(&text)?;
    validate_config(&config)?;
    info!(
        systems = config.systems.len(),
        work_dir = %config.work_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

/// Loads and validates a plan file.
pub fn load_plan(path: &Path) -> Result<Plan> {
    if !path.exists() {
        return Err(FlowError::PlanNotFound {
            path: path.display().to_string(),
        });
    }
    let text = std::fs::read_to_string(path)?;
    let plan: Plan = serde_saphyr::from_str(&text)?;
    plan.validate()?;
    info!(
        path = %path.display(),
        processes = plan.processes.len(),
        compounds = plan.compounds.len(),
        "plan loaded"
    );
    Ok(plan)
}

fn validate_config(config: &Config) -> Result<()> {
    for (id, system) in &config.systems {
        if system.identity.hostname.trim().is_empty() {
            return Err(FlowError::Config(format!(
                "system '{id}' has an empty hostname"
            )));
        }
        if system.identity.user.trim().is_empty() {
            return Err(FlowError::Config(format!("system '{id}' has an empty user")));
        }
        if system.identity.max_channels == 0 {
            return Err(FlowError::Config(format!(
                "system '{id}' must allow at least one channel"
            )));
        }
    }
    // The template must contain the placeholder or wrong-exit detection
    // would match every prompt line.
    if !config.completion.reject_template.contains("{sentinel}") {
        return Err(FlowError::Config(
            "completion.reject_template must contain the {sentinel} placeholder".to_string(),
        ));
    }
    Ok(())
}
