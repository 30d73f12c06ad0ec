//! Reconnection policy

use crate::constants::{DEFAULT_NETWORK_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL_SECS};
use crate::transport::TransportKind;
use std::time::Duration;

/// When and how often to retry after an unexpected transport loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub interval: Duration,
    /// `None` retries until success or explicit disconnect
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Default for a transport: unlimited for wireless, bounded for network
    pub fn default_for(kind: TransportKind) -> Self {
        let max_attempts = match kind {
            TransportKind::Wireless => None,
            TransportKind::Network => Some(DEFAULT_NETWORK_MAX_RECONNECT_ATTEMPTS),
        };
        Self {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_RECONNECT_INTERVAL_SECS),
            max_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| attempts < max)
    }
}
