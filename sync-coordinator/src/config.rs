//! Configuration loading for the sync layer.
//!
//! Configuration is loaded from a TOML file; every field has a
//! default so an empty file (or no file) yields a working setup.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use sync_lan::LanConfig;
use sync_relay::RelayConfig;
use sync_types::DeviceClass;

/// Root configuration for the sync layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// LAN transport configuration.
    #[serde(default)]
    pub lan: LanSection,
    /// Relay transport configuration.
    #[serde(default)]
    pub relay: RelaySection,
    /// Hub bridging configuration.
    #[serde(default)]
    pub bridge: BridgeSection,
    /// Cloud polling configuration.
    #[serde(default)]
    pub cloud: CloudSection,
}

/// LAN transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LanSection {
    /// TCP listen port; 0 picks an ephemeral port (default: 0).
    #[serde(default)]
    pub listen_port: u16,
    /// Run multicast discovery (default: true).
    #[serde(default = "default_enable_discovery")]
    pub enable_discovery: bool,
    /// Multicast group for discovery beacons (default: 239.255.70.83).
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    /// Shared UDP port for discovery beacons (default: 53530).
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,
    /// Seconds between re-advertisements (default: 5).
    #[serde(default = "default_announce_interval_secs")]
    pub announce_interval_secs: u64,
}

/// Relay transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// Daily budget for the priority channel (default: 50).
    #[serde(default = "default_priority_daily_limit")]
    pub priority_daily_limit: u32,
}

/// Hub bridging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeSection {
    /// Force bridging on or off. Unset means the device class
    /// decides: phones bridge, everything else does not.
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Cloud polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudSection {
    /// Seconds between cloud pulls (default: 30).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

// Default value functions
fn default_enable_discovery() -> bool {
    true
}

fn default_multicast_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 70, 83)
}

fn default_multicast_port() -> u16 {
    53530
}

fn default_announce_interval_secs() -> u64 {
    5
}

fn default_priority_daily_limit() -> u32 {
    sync_relay::DEFAULT_PRIORITY_DAILY_LIMIT
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for LanSection {
    fn default() -> Self {
        Self {
            listen_port: 0,
            enable_discovery: default_enable_discovery(),
            multicast_group: default_multicast_group(),
            multicast_port: default_multicast_port(),
            announce_interval_secs: default_announce_interval_secs(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            priority_daily_limit: default_priority_daily_limit(),
        }
    }
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// The LAN transport configuration this selects.
    ///
    /// A configured interval of zero is clamped to one second; the
    /// timer machinery cannot run on a zero period.
    pub fn lan_config(&self) -> LanConfig {
        LanConfig {
            listen_port: self.lan.listen_port,
            enable_discovery: self.lan.enable_discovery,
            multicast_group: self.lan.multicast_group,
            multicast_port: self.lan.multicast_port,
            announce_interval: Duration::from_secs(self.lan.announce_interval_secs.max(1)),
        }
    }

    /// The relay transport configuration this selects.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            priority_daily_limit: self.relay.priority_daily_limit,
        }
    }

    /// Whether this device should bridge between transports.
    ///
    /// An explicit setting wins; otherwise phones bridge because they
    /// are the only class that can reach both the LAN and the
    /// wearable.
    pub fn bridge_enabled(&self, class: DeviceClass) -> bool {
        self.bridge
            .enabled
            .unwrap_or(class == DeviceClass::Phone)
    }

    /// How often to pull from the cloud store.
    ///
    /// A configured interval of zero is clamped to one second.
    pub fn cloud_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cloud.poll_interval_secs.max(1))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
