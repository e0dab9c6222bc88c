//! Command execution port: the orchestrator's boundary to the remote
//! shell protocol layer.

use async_trait::async_trait;

use crate::error::Result;
use crate::ssh::{CapturedOutput, Command};

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs one command on its target system and returns the captured
    /// output lines.
    async fn run(&self, command: &Command) -> Result<CapturedOutput>;
}
