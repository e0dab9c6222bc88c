pub mod channel;
pub mod connector;
pub mod executor;
pub mod progress;
pub mod query;

pub use channel::ChannelIo;
pub use connector::{PooledSession, SessionConnector};
pub use executor::CommandExecutor;
pub use progress::{ProgressSink, ProgressUpdate};
pub use query::QueryExecutor;
