#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::time::Duration;

/// The top-level configuration for the `otp-relay-connector` library.
///
/// This struct aggregates the reconnect policy, credential persistence policy,
/// recipient addressing rules and channel capacities. It is typically deserialized
/// from a configuration file and passed to the `ConnectionController` upon
/// initialization.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct ConnectorConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub reconnect: ReconnectConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub credentials: CredentialsConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub addressing: AddressingConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub channels: ChannelConfig,
}

/// Delays applied by the controller before it re-opens a transport session.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct ReconnectConfig {
    /// Delay after an ordinary recoverable disconnect.
    pub default_delay_ms: u64,
    /// Delay after the transport reports a stream-protocol error.
    pub stream_error_delay_ms: u64,
    /// Delay after the transport reports an authorization failure.
    pub unauthorized_delay_ms: u64,
    /// Delay between an explicit `restart()` and the next session open.
    pub restart_delay_ms: u64,
    /// Delay before retrying after the transport failed to open a session at all.
    pub init_retry_delay_ms: u64,
}

/// Controls how credential writes are retried before the failure is surfaced.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct CredentialsConfig {
    /// Total number of write attempts for the `creds` record. Values below 1 are treated as 1.
    pub write_attempts: u32,
    /// Base backoff between attempts; attempt `n` waits `n * write_backoff_ms`.
    pub write_backoff_ms: u64,
}

/// Rules for turning a user-supplied phone number into a transport address.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct AddressingConfig {
    /// Country calling code prepended to numbers that do not already carry it.
    pub default_country_code: String,
    /// Suffix appended to the digits to form the transport's user address.
    pub address_suffix: String,
}

/// Defines capacities for the MPSC channels within the connector.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct ChannelConfig {
    /// The buffer capacity for the controller's command queue.
    pub command_buffer: usize,
}

impl ReconnectConfig {
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    pub fn stream_error_delay(&self) -> Duration {
        Duration::from_millis(self.stream_error_delay_ms)
    }

    pub fn unauthorized_delay(&self) -> Duration {
        Duration::from_millis(self.unauthorized_delay_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn init_retry_delay(&self) -> Duration {
        Duration::from_millis(self.init_retry_delay_ms)
    }
}

impl CredentialsConfig {
    pub fn attempts(&self) -> u32 {
        self.write_attempts.max(1)
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.write_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 3_000,
            stream_error_delay_ms: 5_000,
            unauthorized_delay_ms: 10_000,
            restart_delay_ms: 1_000,
            init_retry_delay_ms: 5_000,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            write_attempts: 3,
            write_backoff_ms: 200,
        }
    }
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            default_country_code: "62".to_string(),
            address_suffix: "@s.whatsapp.net".to_string(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { command_buffer: 64 }
    }
}
