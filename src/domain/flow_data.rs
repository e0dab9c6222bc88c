//! Shared parameter map that steps read from and write into during a
//! compound run.

use std::collections::HashMap;

/// Mutable key/value state threaded through an execution.
///
/// A key also acts as a skip guard: a step declaring an input reference
/// only runs if [`FlowData::is_truthy`] holds for that key.
#[derive(Debug, Clone, Default)]
pub struct FlowData {
    values: HashMap<String, String>,
}

impl FlowData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds flow data from `key=value` pairs, as given on the CLI.
    pub fn from_pairs<I, S>(pairs: I) -> crate::error::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flow = Self::default();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                crate::error::FlowError::Config(format!(
                    "flow data entry '{pair}' is not key=value"
                ))
            })?;
            flow.set(key, value);
        }
        Ok(flow)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Skip-guard check: present, non-empty, and not "false".
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.get(key) {
            Some(value) => !value.trim().is_empty() && !value.trim().eq_ignore_ascii_case("false"),
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_present_value() {
        let mut flow = FlowData::new();
        flow.set("deploy", "yes");
        assert!(flow.is_truthy("deploy"));
    }

    #[test]
    fn test_truthy_absent_key() {
        assert!(!FlowData::new().is_truthy("deploy"));
    }

    #[test]
    fn test_truthy_empty_value() {
        let mut flow = FlowData::new();
        flow.set("deploy", "  ");
        assert!(!flow.is_truthy("deploy"));
    }

    #[test]
    fn test_truthy_false_value() {
        let mut flow = FlowData::new();
        flow.set("deploy", "FALSE");
        assert!(!flow.is_truthy("deploy"));
    }

    #[test]
    fn test_from_pairs() {
        let flow = FlowData::from_pairs(["env=staging", "build=42"]).unwrap();
        assert_eq!(flow.get("env"), Some("staging"));
        assert_eq!(flow.get("build"), Some("42"));
        assert_eq!(flow.len(), 2);
    }

    #[test]
    fn test_from_pairs_malformed() {
        assert!(FlowData::from_pairs(["no-equals-sign"]).is_err());
    }
}
