//! Plan file types: the inbound boundary carrying resolved step definitions.
//!
//! A plan names processes (single remote commands with prerequisites,
//! validations, switches, and a marker) and compounds (ordered lists of
//! process steps with stop-on-fail semantics). Plans are authored in YAML
//! and validated before any execution starts.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Marker, Switcher};
use crate::error::{FlowError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Plan {
    #[serde(default)]
    pub processes: Vec<ProcessDef>,

    #[serde(default)]
    pub compounds: Vec<CompoundDef>,
}

impl Plan {
    #[must_use]
    pub fn process(&self, name: &str) -> Option<&ProcessDef> {
        self.processes.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn compound(&self, name: &str) -> Option<&CompoundDef> {
        self.compounds.iter().find(|c| c.name == name)
    }

    /// Full structural validation: unique names, resolvable step
    /// references, and compilable regex patterns.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for process in &self.processes {
            if !seen.insert(process.name.as_str()) {
                return Err(FlowError::Config(format!(
                    "duplicate process name: {}",
                    process.name
                )));
            }
            process.validate()?;
        }

        let mut seen = std::collections::HashSet::new();
        for compound in &self.compounds {
            if !seen.insert(compound.name.as_str()) {
                return Err(FlowError::Config(format!(
                    "duplicate compound name: {}",
                    compound.name
                )));
            }
            if compound.steps.is_empty() {
                return Err(FlowError::Config(format!(
                    "compound '{}' has no steps",
                    compound.name
                )));
            }
            for step in &compound.steps {
                if self.process(step).is_none() {
                    return Err(FlowError::Config(format!(
                        "compound '{}' references unknown process '{step}'",
                        compound.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// One executable process step.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessDef {
    pub name: String,

    /// Target system id, resolved against the `systems` config map
    pub system: String,

    pub command: String,

    /// Overrides the configured default command timeout
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Skip guard: when set, the step only runs if the flow-data entry
    /// under this key is present, non-empty, and not "false"
    #[serde(default)]
    pub input_ref: Option<String>,

    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,

    #[serde(default)]
    pub validations: Vec<Validation>,

    /// Switch templates; cloned per execution before resolution
    #[serde(default)]
    pub switches: Vec<Switcher>,

    #[serde(default)]
    pub marker: MarkerDef,

    /// Regex whose first capture group extracts remote file paths from
    /// the captured output, recorded on the response for later transfer
    #[serde(default)]
    pub extract_files: Option<String>,
}

impl ProcessDef {
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(FlowError::Config(format!(
                "process '{}' has an empty command",
                self.name
            )));
        }
        self.marker.compile()?;
        for validation in &self.validations {
            validation.marker.compile()?;
        }
        if let Some(pattern) = &self.extract_files {
            Regex::new(pattern).map_err(|e| FlowError::InvalidMarker {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompoundDef {
    pub name: String,

    #[serde(default = "default_stop_on_fail")]
    pub stop_on_fail: bool,

    /// Ordered process names executed sequentially
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Runs over the remote shell channel
    Shell,
    /// Runs against a backend query executor (SQL/REST)
    Query,
}

/// A command run synchronously before the main command. A failing
/// prerequisite fails the step.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Prerequisite {
    pub kind: StepKind,
    pub text: String,
}

/// A command run after the main command; its output is evaluated
/// against its own marker and merged into the step status.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Validation {
    pub kind: StepKind,
    pub text: String,
    #[serde(default)]
    pub marker: MarkerDef,
}

/// Marker patterns as authored in the plan file; compiled into a
/// [`Marker`] before evaluation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MarkerDef {
    #[serde(default)]
    pub fail: Vec<String>,
    #[serde(default)]
    pub warn: Vec<String>,
    #[serde(default)]
    pub pass: Vec<String>,
    #[serde(default)]
    pub fail_when_no_pass: bool,
}

impl MarkerDef {
    pub fn compile(&self) -> Result<Marker> {
        Marker::new(&self.fail, &self.warn, &self.pass, self.fail_when_no_pass)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fail.is_empty() && self.warn.is_empty() && self.pass.is_empty()
    }
}

const fn default_stop_on_fail() -> bool {
    true
}
