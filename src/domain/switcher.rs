//! Switch templates: named booleans that inject extra text before a
//! command or a backend query.
//!
//! Plan files carry switches as immutable templates. Each execution
//! deep-clones them, overrides values from flow data, and only then
//! reads the selected actions, so concurrent executions never see each
//! other's mutations.

use serde::{Deserialize, Serialize};

use crate::domain::FlowData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchKind {
    /// Injected before the main shell command
    #[default]
    Command,
    /// Injected before a backend query
    Query,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Switcher {
    pub name: String,

    #[serde(default)]
    pub value: bool,

    #[serde(default)]
    pub true_action: Option<String>,

    #[serde(default)]
    pub false_action: Option<String>,

    #[serde(default)]
    pub kind: SwitchKind,
}

impl Switcher {
    /// Action text selected by the current value, if any.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        let chosen = if self.value {
            &self.true_action
        } else {
            &self.false_action
        };
        chosen.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// Resolves switch templates against flow data and collects the actions
/// of the requested kind, in declaration order.
///
/// Templates are cloned before the flow-data override so callers can
/// hand in a shared default list safely.
#[must_use]
pub fn resolve_actions(templates: &[Switcher], flow: &FlowData, kind: SwitchKind) -> Vec<String> {
    let mut resolved: Vec<Switcher> = templates.to_vec();
    for switch in &mut resolved {
        if let Some(value) = flow.get(&switch.name) {
            switch.value = value.eq_ignore_ascii_case("true");
        }
    }
    resolved
        .iter()
        .filter(|s| s.kind == kind)
        .filter_map(|s| s.action().map(ToString::to_string))
        .collect()
}
