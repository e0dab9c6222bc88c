//! SSH-backed command executor: binds the session pool, the sentinel
//! runner, and the file transfer runner to the configured system map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, SystemConfig};

const STAGE_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
use crate::error::{FlowError, Result};
use crate::ports::CommandExecutor;
use crate::ssh::command::{CapturedOutput, Command, ShellRunner};
use crate::ssh::connector::RusshConnector;
use crate::ssh::pool::SessionPool;
use crate::ssh::transfer::FileTransfer;

pub struct SshExecutor {
    pool: SessionPool<RusshConnector>,
    runner: ShellRunner,
    transfer: FileTransfer,
    systems: HashMap<String, SystemConfig>,
    reject_template: String,
}

impl SshExecutor {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let connector = RusshConnector::new(&config.limits);
        Self {
            pool: SessionPool::new(
                connector,
                Duration::from_secs(config.limits.idle_timeout_seconds),
            ),
            runner: ShellRunner::new(),
            transfer: FileTransfer::new(config.limits.transfer_attempts),
            systems: config.systems.clone(),
            reject_template: config.completion.reject_template.clone(),
        }
    }

    /// Staging commands run through the same sentinel protocol as plan
    /// steps and must carry the configured wrong-exit template.
    fn staging_command(&self, text: String, system_id: &str) -> Command {
        let mut command = Command::new(text, system_id, STAGE_COMMAND_TIMEOUT);
        command.reject_template = self.reject_template.clone();
        command
    }

    fn system(&self, id: &str) -> Result<&SystemConfig> {
        self.systems.get(id).ok_or_else(|| FlowError::UnknownSystem {
            system: id.to_string(),
        })
    }

    /// Downloads a remote file into `local_dir`. With a staging policy
    /// active, the file is first copied into the remote stage directory
    /// over the shell channel and fetched from there.
    pub async fn fetch_file(
        &self,
        system_id: &str,
        remote: &str,
        local_dir: &Path,
    ) -> Result<PathBuf> {
        let system = self.system(system_id)?;
        let session = self
            .pool
            .get(system_id, &system.identity, system.routing_prefix.as_deref())
            .await?;

        let Some(stage_dir) = &system.stage_dir else {
            return self.transfer.download(&session, remote, local_dir).await;
        };

        let base = remote.rsplit('/').next().unwrap_or(remote);
        let staged = format!("{}/{base}", stage_dir.trim_end_matches('/'));
        debug!(system = %system_id, remote = %remote, staged = %staged, "staging download");

        let copy = self.staging_command(
            format!("cp -f {remote} {staged} && chmod 666 {staged}"),
            system_id,
        );
        self.run(&copy).await?;

        let local = self.transfer.download(&session, &staged, local_dir).await?;
        if let Err(e) = self.transfer.remove(&session, &staged).await {
            debug!(staged = %staged, error = %e, "stage cleanup failed");
        }
        Ok(local)
    }

    /// Uploads a local file to a remote path, staging through the
    /// configured directory when the policy is active.
    pub async fn push_file(&self, system_id: &str, local: &Path, remote: &str) -> Result<()> {
        let system = self.system(system_id)?;
        let session = self
            .pool
            .get(system_id, &system.identity, system.routing_prefix.as_deref())
            .await?;

        let Some(stage_dir) = &system.stage_dir else {
            return self.transfer.upload(&session, local, remote).await;
        };

        let base = remote.rsplit('/').next().unwrap_or(remote);
        let staged = format!("{}/{base}", stage_dir.trim_end_matches('/'));
        debug!(system = %system_id, remote = %remote, staged = %staged, "staging upload");

        self.transfer.upload(&session, local, &staged).await?;
        let copy = self.staging_command(format!("cp -f {staged} {remote}"), system_id);
        self.run(&copy).await?;

        if let Err(e) = self.transfer.remove(&session, &staged).await {
            debug!(staged = %staged, error = %e, "stage cleanup failed");
        }
        Ok(())
    }

    pub async fn reset_sessions(&self) {
        self.pool.reset_all().await;
    }

    pub async fn evict_idle_sessions(&self) -> usize {
        self.pool.evict_idle().await
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn run(&self, command: &Command) -> Result<CapturedOutput> {
        let system = self.system(&command.system)?;
        let session = self
            .pool
            .get(
                &command.system,
                &system.identity,
                system.routing_prefix.as_deref(),
            )
            .await?;

        // The quota wait ceiling tracks the command timeout so a
        // saturated session fails within the caller's own deadline.
        let wait_ceiling = command.timeout.max(Duration::from_secs(1));
        let mut channel = session.open_shell(wait_ceiling).await?;

        let result = self
            .runner
            .run(
                &mut channel,
                &system.identity.hostname,
                system.routing_prefix.as_deref(),
                command,
            )
            .await;

        channel.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_command_carries_configured_reject_template() {
        let config = Config {
            completion: crate::config::CompletionConfig {
                reject_template: r"PS1>\s*{sentinel}".to_string(),
            },
            ..Config::default()
        };
        let executor = SshExecutor::new(&config);

        let command = executor.staging_command("cp -f /a /b".to_string(), "app");
        assert_eq!(command.reject_template, r"PS1>\s*{sentinel}");
        assert_eq!(command.system, "app");
        assert_eq!(command.timeout, STAGE_COMMAND_TIMEOUT);
    }
}
