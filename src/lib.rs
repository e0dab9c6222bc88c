//! Test-automation engine driving remote systems over pooled SSH
//! sessions.
//!
//! Plans name processes (single remote commands with prerequisites,
//! validations, switches, and a status marker) and compounds (ordered
//! step lists with stop-on-fail). Commands run over interactive shell
//! channels with sentinel-based completion detection, output is
//! classified into PASS/WARN/FAIL by regex markers, and every finished
//! step streams to a progress sink.

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exec;
pub mod ports;
pub mod ssh;

pub use config::{load_config, load_plan, Config, Plan};
pub use domain::{FlowData, Marker, Status};
pub use error::{FlowError, Result};
pub use exec::{Orchestrator, ProcessExecutionResponse};
pub use ports::{CommandExecutor, ProgressSink, ProgressUpdate, QueryExecutor};
pub use ssh::SshExecutor;
