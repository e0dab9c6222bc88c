pub mod command;
pub mod connector;
pub mod executor;
pub mod pool;
pub mod quota;
pub mod retry;
pub mod session;
pub mod transfer;

pub use command::{CapturedOutput, Command, CommandPatch, ScanOutcome, SentinelScanner, ShellRunner};
pub use connector::RusshConnector;
pub use executor::SshExecutor;
pub use pool::SessionPool;
pub use quota::{ChannelPermit, ChannelQuota};
pub use session::{ChannelHandle, RemoteSession, SftpHandle};
pub use transfer::FileTransfer;
