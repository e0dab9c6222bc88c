//! SFTP file transfer with bounded retry.
//!
//! Each operation opens its own channel from the session and retries
//! transient channel failures with backoff. A missing remote file is
//! surfaced immediately and never retried.

use std::path::{Path, PathBuf};
use std::time::Duration;

use russh_sftp::protocol::FileAttributes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{FlowError, Result};
use crate::ssh::retry::{is_transient, with_retry_if, RetryConfig};
use crate::ssh::session::RemoteSession;

pub struct FileTransfer {
    retry: RetryConfig,
    /// Quota wait ceiling for the transfer channel
    channel_wait: Duration,
}

impl Default for FileTransfer {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            channel_wait: Duration::from_secs(30),
        }
    }
}

impl FileTransfer {
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self {
            retry: RetryConfig::with_max_attempts(attempts.max(1)),
            ..Default::default()
        }
    }

    /// Downloads `remote` into `local_dir`, keeping the remote base
    /// name. Returns the local path.
    pub async fn download(
        &self,
        session: &RemoteSession,
        remote: &str,
        local_dir: &Path,
    ) -> Result<PathBuf> {
        let local_path = local_dir.join(remote_base_name(remote)?);

        with_retry_if(
            &self.retry,
            "sftp download",
            || {
                let local_path = local_path.clone();
                async move {
                    let sftp = session.open_sftp(self.channel_wait).await?;
                    if !sftp
                        .session
                        .try_exists(remote)
                        .await
                        .map_err(sftp_error)?
                    {
                        return Err(FlowError::FileMissing {
                            path: remote.to_string(),
                        });
                    }

                    let mut remote_file =
                        sftp.session.open(remote).await.map_err(sftp_error)?;
                    let mut local_file = tokio::fs::File::create(&local_path).await?;
                    let bytes = tokio::io::copy(&mut remote_file, &mut local_file)
                        .await
                        .map_err(|e| FlowError::Transfer {
                            reason: format!("download stream failed: {e}"),
                        })?;
                    local_file.flush().await?;

                    info!(remote = %remote, local = %local_path.display(), bytes, "file downloaded");
                    Ok(())
                }
            },
            is_transient,
        )
        .await?;

        Ok(local_path)
    }

    /// Uploads `local` to `remote`, then best-effort opens the file up
    /// world-writable so follow-up steps running as other users can
    /// replace it.
    pub async fn upload(&self, session: &RemoteSession, local: &Path, remote: &str) -> Result<()> {
        with_retry_if(
            &self.retry,
            "sftp upload",
            || async move {
                let sftp = session.open_sftp(self.channel_wait).await?;

                let mut local_file = tokio::fs::File::open(local).await?;
                let mut remote_file =
                    sftp.session.create(remote).await.map_err(sftp_error)?;
                let bytes = tokio::io::copy(&mut local_file, &mut remote_file)
                    .await
                    .map_err(|e| FlowError::Transfer {
                        reason: format!("upload stream failed: {e}"),
                    })?;
                remote_file.shutdown().await.map_err(|e| FlowError::Transfer {
                    reason: format!("upload close failed: {e}"),
                })?;

                let mut attrs = FileAttributes::empty();
                attrs.permissions = Some(0o666);
                if let Err(e) = sftp.session.set_metadata(remote, attrs).await {
                    // Another actor may have removed the file between
                    // upload and chmod; only that race is swallowed.
                    match sftp.session.try_exists(remote).await {
                        Ok(false) => {
                            warn!(remote = %remote, "uploaded file vanished before chmod, ignoring");
                        }
                        _ => {
                            return Err(FlowError::Transfer {
                                reason: format!("chmod failed: {e}"),
                            });
                        }
                    }
                }

                info!(local = %local.display(), remote = %remote, bytes, "file uploaded");
                Ok(())
            },
            is_transient,
        )
        .await
    }

    /// Removes a remote file.
    pub async fn remove(&self, session: &RemoteSession, remote: &str) -> Result<()> {
        with_retry_if(
            &self.retry,
            "sftp remove",
            || async move {
                let sftp = session.open_sftp(self.channel_wait).await?;
                if !sftp
                    .session
                    .try_exists(remote)
                    .await
                    .map_err(sftp_error)?
                {
                    return Err(FlowError::FileMissing {
                        path: remote.to_string(),
                    });
                }
                sftp.session.remove_file(remote).await.map_err(sftp_error)?;
                debug!(remote = %remote, "file removed");
                Ok(())
            },
            is_transient,
        )
        .await
    }
}

fn sftp_error(e: russh_sftp::client::error::Error) -> FlowError {
    FlowError::Transfer {
        reason: format!("sftp channel error: {e}"),
    }
}

fn remote_base_name(remote: &str) -> Result<&str> {
    remote
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| FlowError::Transfer {
            reason: format!("remote path has no file name: {remote}"),
        })
}
