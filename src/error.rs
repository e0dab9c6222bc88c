use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Plan file not found: {path}")]
    PlanNotFound { path: String },

    #[error("Invalid marker pattern '{pattern}': {reason}")]
    InvalidMarker { pattern: String, reason: String },

    // Session errors
    #[error("Cannot establish session to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("Authentication failed for {user}@{host}")]
    Auth { user: String, host: String },

    #[error("Key file invalid: {path}")]
    KeyInvalid { path: String },

    #[error("Failed to open channel on {host}: {reason}")]
    ChannelOpen { host: String, reason: String },

    #[error("Too many concurrent channels on {host} (max: {max}, waited {waited_ms}ms)")]
    ChannelQuota {
        host: String,
        max: usize,
        waited_ms: u64,
    },

    #[error("Session to {host} is busy, disconnect refused")]
    SessionBusy { host: String },

    // Command execution errors
    #[error("Command rejected by remote shell on {host}: {line}")]
    WrongExit { host: String, line: String },

    #[error("Command timed out after {seconds}s on {host}")]
    Timeout { host: String, seconds: u64 },

    #[error("Channel closed before completion on {host}")]
    ChannelClosed { host: String },

    // File transfer errors
    #[error("File transfer failed: {reason}")]
    Transfer { reason: String },

    #[error("Remote file does not exist: {path}")]
    FileMissing { path: String },

    // Orchestration errors
    #[error("Unknown target system: {system}")]
    UnknownSystem { system: String },

    #[error("No query executor configured for system {system}")]
    QueryUnsupported { system: String },

    #[error("Step failed: {reason}")]
    Step { reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
