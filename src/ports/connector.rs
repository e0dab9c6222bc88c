//! Session connector port.
//!
//! Abstracts session creation and lifecycle so pool semantics (reuse,
//! staleness replacement, idle eviction) are testable without a real
//! SSH server.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::HostIdentity;
use crate::error::Result;

/// Lifecycle view of a pooled session.
#[async_trait]
pub trait PooledSession: Send + Sync + 'static {
    /// Whether the session was created from exactly this identity.
    /// A mismatch means configuration drift and forces recreation.
    fn is_same(&self, identity: &HostIdentity) -> bool;

    /// Live transport check, not just "no error seen so far".
    async fn is_connected(&self) -> bool;

    /// Any in-flight channel on this session.
    fn is_busy(&self) -> bool;

    /// Refused with `FlowError::SessionBusy` while channels are open.
    async fn disconnect(&self) -> Result<()>;

    fn touch(&self);

    fn idle_for(&self) -> Duration;
}

/// Creates sessions for the pool.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    type Session: PooledSession;

    async fn connect(
        &self,
        system_id: &str,
        identity: &HostIdentity,
        routing_prefix: Option<&str>,
    ) -> Result<Self::Session>;
}
