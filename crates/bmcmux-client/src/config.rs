//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pacing of the firmware install state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwarePollConfig {
    /// Wait between task status polls
    pub poll_interval: Duration,
    /// Wait after a transient error, e.g. while the BMC reboots
    pub transient_backoff: Duration,
}

impl Default for FirmwarePollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            transient_backoff: Duration::from_secs(10),
        }
    }
}

/// Client-wide settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fixed timeout for every provider attempt. When unset, the caller's
    /// remaining time is split across eligible providers.
    pub per_provider_timeout: Option<Duration>,
    pub firmware: FirmwarePollConfig,
}

impl ClientConfig {
    pub fn with_per_provider_timeout(mut self, timeout: Duration) -> Self {
        self.per_provider_timeout = Some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.firmware.poll_interval = interval;
        self
    }

    pub fn with_transient_backoff(mut self, backoff: Duration) -> Self {
        self.firmware.transient_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.per_provider_timeout.is_none());
        assert_eq!(config.firmware.poll_interval, Duration::from_secs(2));
        assert_eq!(config.firmware.transient_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"per_provider_timeout": {"secs": 5, "nanos": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.per_provider_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.firmware, FirmwarePollConfig::default());
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::default()
            .with_per_provider_timeout(Duration::from_secs(3))
            .with_poll_interval(Duration::from_millis(100))
            .with_transient_backoff(Duration::from_secs(1));
        assert_eq!(config.per_provider_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.firmware.poll_interval, Duration::from_millis(100));
        assert_eq!(config.firmware.transient_backoff, Duration::from_secs(1));
    }
}
