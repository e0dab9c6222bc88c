use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Target systems addressable by process steps, keyed by system id
    #[serde(default)]
    pub systems: HashMap<String, SystemConfig>,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// Directory where per-step output logs and staged files are written
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default)]
    pub completion: CompletionConfig,
}

/// One remote target system: host identity plus routing policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SystemConfig {
    #[serde(flatten)]
    pub identity: HostIdentity,

    /// Command text injected before every command on this system,
    /// e.g. to hop through an intermediate shell. Also part of the
    /// session pool key.
    #[serde(default)]
    pub routing_prefix: Option<String>,

    /// Remote working directory used to stage file transfers when a
    /// routing prefix is active (or always, when set without one).
    #[serde(default)]
    pub stage_dir: Option<String>,
}

/// Identity and per-connection tunables of one remote host.
///
/// Equality over all fields drives session pool lookup: any drift in
/// credentials, key-file path, or tunables makes a pooled session stale
/// and forces recreation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HostIdentity {
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub user: String,

    pub auth: AuthConfig,

    /// Maximum channels open concurrently on one session
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Total connect attempts before giving up (1 initial + retries)
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_keepalive")]
    pub keepalive_interval_seconds: u64,

    /// Request a pty on the shell channel (some appliances require it)
    #[serde(default)]
    pub request_pty: bool,
}

impl HostIdentity {
    /// Stable address string used in log events and error messages.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.user, self.hostname, self.port)
    }
}

/// Authentication material.
///
/// Sensitive fields (`password`, `passphrase`) are wrapped in [`Zeroizing`]
/// so they are erased from memory when a stale identity is dropped.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    Key {
        path: String,
        #[serde(default)]
        passphrase: Option<Zeroizing<String>>,
    },
    Password {
        password: Zeroizing<String>,
    },
}

impl PartialEq for AuthConfig {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Key {
                    path: a,
                    passphrase: pa,
                },
                Self::Key {
                    path: b,
                    passphrase: pb,
                },
            ) => {
                a == b
                    && pa.as_ref().map(|z| z.as_str()) == pb.as_ref().map(|z| z.as_str())
            }
            (Self::Password { password: a }, Self::Password { password: b }) => {
                a.as_str() == b.as_str()
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Default command timeout; a process step may override it
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// Bounded retry count for opening a channel on a live session
    #[serde(default = "default_channel_open_attempts")]
    pub channel_open_attempts: u32,

    /// Bounded retry count for transient file-transfer errors
    #[serde(default = "default_transfer_attempts")]
    pub transfer_attempts: u32,

    /// Idle window after which unpinned pooled sessions are evicted
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Display fallback: number of trailing lines kept when no marker matched
    #[serde(default = "default_tail_lines")]
    pub display_tail_lines: usize,

    /// Display fallback: byte cap on the kept tail
    #[serde(default = "default_tail_bytes")]
    pub display_tail_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            command_timeout_seconds: default_command_timeout(),
            channel_open_attempts: default_channel_open_attempts(),
            transfer_attempts: default_transfer_attempts(),
            idle_timeout_seconds: default_idle_timeout(),
            display_tail_lines: default_tail_lines(),
            display_tail_bytes: default_tail_bytes(),
        }
    }
}

/// Completion-detection settings for the sentinel protocol.
///
/// `reject_template` is a regex with a `{sentinel}` placeholder; a line
/// matching it (but not equal to the bare sentinel) means the shell echoed
/// the queued sentinel back inside its prompt, i.e. the command itself was
/// rejected. The default covers common sh/bash/ksh prompt formats; hosts
/// with exotic prompts can override it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompletionConfig {
    #[serde(default = "default_reject_template")]
    pub reject_template: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            reject_template: default_reject_template(),
        }
    }
}

const fn default_port() -> u16 {
    22
}

const fn default_max_channels() -> usize {
    5
}

const fn default_connect_timeout() -> u64 {
    20
}

const fn default_connect_attempts() -> u32 {
    3
}

const fn default_keepalive() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    300
}

const fn default_channel_open_attempts() -> u32 {
    3
}

const fn default_transfer_attempts() -> u32 {
    3
}

const fn default_idle_timeout() -> u64 {
    600
}

const fn default_tail_lines() -> usize {
    50
}

const fn default_tail_bytes() -> usize {
    16 * 1024
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("testflow-work")
}

fn default_reject_template() -> String {
    r"[#$>]\s*(echo\s+)?{sentinel}\s*$".to_string()
}
