//! Bridge configuration
//!
//! Plain settings, read once at startup from a TOML document. Nothing
//! here is reconfigured at runtime. Every field has a default, so an
//! empty document gives a working (open) access point.
//!
//! ```toml
//! [wifi]
//! ssid = "eth2ap"
//! password = "correct horse"
//! channel = 6
//! max_connections = 4
//!
//! [ethernet]
//! phy_addr = 1
//!
//! [relay]
//! queue_len = 40
//! backoff_budget_ms = 100
//! ```

use core::{num::NonZeroUsize, time::Duration};
use std::path::Path;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::{
    queue::{DEFAULT_ENQUEUE_TIMEOUT, DEFAULT_QUEUE_LEN},
    worker::{BackoffPolicy, DEFAULT_DEQUEUE_TIMEOUT},
};

pub const DEFAULT_SSID: &str = "eth2ap";
pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
/// WPA2 passphrases are at least this long
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PEERS: u8 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub wifi: WifiConfig,
    pub ethernet: EthernetConfig,
    pub relay: RelayConfig,
}

/// Access point settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WifiConfig {
    pub ssid: String<MAX_SSID_LEN>,
    /// Empty for an open network
    pub password: String<MAX_PASSWORD_LEN>,
    pub channel: u8,
    pub max_connections: u8,
    pub hidden: bool,
}

/// Wired port settings
///
/// Pin assignments are passed through to the platform untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EthernetConfig {
    pub phy_addr: u8,
    pub mdc_pin: u8,
    pub mdio_pin: u8,
    pub phy_enable_pin: u8,
    /// Receive every frame on the wire, not only ones for our address
    pub promiscuous: bool,
}

/// Relay queue and worker tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub queue_len: usize,
    pub enqueue_timeout_ms: u64,
    pub dequeue_timeout_ms: u64,
    pub backoff_step_ms: u64,
    pub backoff_budget_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Open,
    WpaWpa2Psk,
}

/// What the wireless driver needs to bring up the access point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
    pub auth: AuthMode,
    pub channel: u8,
    pub max_connections: u8,
    pub hidden: bool,
}

// ---- impl BridgeConfig ----

impl BridgeConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let wifi = &self.wifi;
        if wifi.ssid.is_empty() {
            return Err(invalid("wifi.ssid", "must not be empty"));
        }
        let pw_len = wifi.password.len();
        if pw_len != 0 && pw_len < MIN_PASSWORD_LEN {
            return Err(invalid(
                "wifi.password",
                "must be empty or at least 8 characters",
            ));
        }
        if !(1..=14).contains(&wifi.channel) {
            return Err(invalid("wifi.channel", "must be within 1..=14"));
        }
        if !(1..=MAX_PEERS).contains(&wifi.max_connections) {
            return Err(invalid("wifi.max_connections", "must be within 1..=10"));
        }

        let relay = &self.relay;
        relay.capacity()?;
        if relay.backoff_step_ms == 0 {
            return Err(invalid("relay.backoff_step_ms", "must be non-zero"));
        }
        if relay.dequeue_timeout_ms == 0 {
            return Err(invalid("relay.dequeue_timeout_ms", "must be non-zero"));
        }
        Ok(())
    }

    /// The access point settings handed to the wireless driver
    pub fn access_point(&self) -> AccessPointConfig {
        let wifi = &self.wifi;
        let auth = if wifi.password.is_empty() {
            AuthMode::Open
        } else {
            AuthMode::WpaWpa2Psk
        };
        AccessPointConfig {
            ssid: wifi.ssid.clone(),
            password: wifi.password.clone(),
            auth,
            channel: wifi.channel,
            max_connections: wifi.max_connections,
            hidden: wifi.hidden,
        }
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

// ---- defaults ----

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::try_from(DEFAULT_SSID).unwrap_or_default(),
            password: String::new(),
            channel: 1,
            max_connections: 4,
            hidden: false,
        }
    }
}

impl Default for EthernetConfig {
    fn default() -> Self {
        Self {
            phy_addr: 1,
            mdc_pin: 23,
            mdio_pin: 18,
            phy_enable_pin: 5,
            promiscuous: true,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            queue_len: DEFAULT_QUEUE_LEN,
            enqueue_timeout_ms: DEFAULT_ENQUEUE_TIMEOUT.as_millis() as u64,
            dequeue_timeout_ms: DEFAULT_DEQUEUE_TIMEOUT.as_millis() as u64,
            backoff_step_ms: backoff.step.as_millis() as u64,
            backoff_budget_ms: backoff.budget.as_millis() as u64,
        }
    }
}

impl RelayConfig {
    /// The relay queue capacity, which must be non-zero
    pub fn capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.queue_len)
            .ok_or_else(|| invalid("relay.queue_len", "must be non-zero"))
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            step: Duration::from_millis(self.backoff_step_ms),
            budget: Duration::from_millis(self.backoff_budget_ms),
        }
    }
}
