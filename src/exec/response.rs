//! Per-step execution response, appended to the ordered response chain
//! of a compound and streamed to the progress subscriber.

use std::path::PathBuf;

use serde::Serialize;

use crate::domain::Status;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessExecutionResponse {
    pub name: String,
    /// Command text as actually executed, switch actions included
    pub command: String,
    pub status: Status,
    pub skipped: bool,
    pub errors: Vec<String>,
    /// Captured output lives on disk; only the reference travels
    pub log_path: Option<PathBuf>,
    /// Tail of the capture kept for display when no marker matched
    pub display_output: Vec<String>,
    /// Remote file paths pulled out of the output by the extraction regex
    pub extracted_files: Vec<String>,
    pub duration_ms: u64,
}

impl ProcessExecutionResponse {
    #[must_use]
    pub fn started(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            status: Status::Unknown,
            skipped: false,
            errors: Vec::new(),
            log_path: None,
            display_output: Vec::new(),
            extracted_files: Vec::new(),
            duration_ms: 0,
        }
    }

    #[must_use]
    pub fn skipped(name: &str) -> Self {
        Self {
            skipped: true,
            ..Self::started(name, "")
        }
    }

    /// Failure signal for stop-on-fail: a FAIL verdict or any captured
    /// error. Skipped steps never count as failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.skipped && (self.status.is_fail() || !self.errors.is_empty())
    }
}
