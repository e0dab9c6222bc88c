//! Production connector backed by russh.

use async_trait::async_trait;

use crate::config::{HostIdentity, LimitsConfig};
use crate::error::Result;
use crate::ports::SessionConnector;
use crate::ssh::session::RemoteSession;

pub struct RusshConnector {
    channel_open_attempts: u32,
}

impl RusshConnector {
    #[must_use]
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            channel_open_attempts: limits.channel_open_attempts,
        }
    }
}

#[async_trait]
impl SessionConnector for RusshConnector {
    type Session = RemoteSession;

    async fn connect(
        &self,
        system_id: &str,
        identity: &HostIdentity,
        routing_prefix: Option<&str>,
    ) -> Result<Self::Session> {
        RemoteSession::connect(
            system_id,
            identity,
            routing_prefix,
            self.channel_open_attempts,
        )
        .await
    }
}
