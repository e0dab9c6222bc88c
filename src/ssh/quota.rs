//! Per-session channel quota.
//!
//! Each remote session allows a fixed number of concurrently open
//! channels. Acquisition waits on a semaphore bounded by a wait ceiling
//! derived from the command timeout, so a caller never blocks forever
//! when a session is saturated. Permits are RAII: dropping a
//! [`ChannelPermit`] always returns capacity, on every exit path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FlowError, Result};

#[derive(Debug, Clone)]
pub struct ChannelQuota {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// Held capacity for one open channel. Dropping it signals waiters.
#[derive(Debug)]
pub struct ChannelPermit {
    _permit: OwnedSemaphorePermit,
}

impl ChannelQuota {
    #[must_use]
    pub fn new(max_channels: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_channels)),
            max: max_channels,
        }
    }

    /// Waits for channel capacity, at most `wait_ceiling`.
    pub async fn acquire(&self, host: &str, wait_ceiling: Duration) -> Result<ChannelPermit> {
        let started = Instant::now();
        match tokio::time::timeout(wait_ceiling, Arc::clone(&self.semaphore).acquire_owned()).await
        {
            Ok(Ok(permit)) => {
                debug!(
                    host = %host,
                    in_use = self.in_use(),
                    max = self.max,
                    "channel permit acquired"
                );
                Ok(ChannelPermit { _permit: permit })
            }
            // The semaphore is never closed while the session lives.
            Ok(Err(_)) => Err(FlowError::ChannelOpen {
                host: host.to_string(),
                reason: "channel quota released".to_string(),
            }),
            Err(_) => Err(FlowError::ChannelQuota {
                host: host.to_string(),
                max: self.max,
                waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_use() > 0
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }
}
