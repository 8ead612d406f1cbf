//! Configuration types

use std::path::Path;
use std::time::Duration;

use mixcraft_core::{Ticket, U256};
use mixcraft_network::HeartbeatConfig;
use mixcraft_packet::{StoreConfig, TicketConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,

    /// Terms of the tickets this node issues
    #[serde(default)]
    pub tickets: TicketSettings,

    /// Pending acknowledgement storage
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub node: NodeSettings,
}

impl Settings {
    /// Load settings from `path`, or defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            refresh_time: Duration::from_secs(self.heartbeat.refresh_time_secs),
            check_interval_lower: Duration::from_secs(self.heartbeat.check_interval_lower_secs),
            check_interval_upper: Duration::from_secs(self.heartbeat.check_interval_upper_secs),
            // A heartbeat cycle needs at least one worker to make progress
            max_parallel_connections: self.heartbeat.max_parallel_connections.max(1),
            probe_timeout: Duration::from_secs(self.heartbeat.probe_timeout_secs),
        }
    }

    pub fn ticket_config(&self) -> TicketConfig {
        TicketConfig {
            amount: U256::from(self.tickets.amount),
            win_prob: Ticket::win_prob_from_inverse(self.tickets.win_prob_inverse),
            epoch: U256::from(self.tickets.epoch),
            channel_iteration: U256::from(self.tickets.channel_iteration),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            ttl: Duration::from_secs(self.store.ttl_secs),
            max_pending: self.store.max_pending,
            max_acknowledged: self.store.max_acknowledged,
        }
    }
}

/// Heartbeat settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    /// Peers not seen for this long are probed
    #[serde(default = "default_refresh_time")]
    pub refresh_time_secs: u64,

    #[serde(default = "default_check_interval_lower")]
    pub check_interval_lower_secs: u64,

    #[serde(default = "default_check_interval_upper")]
    pub check_interval_upper_secs: u64,

    /// Peers checked at once. 0 is read as 1.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_connections: usize,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_refresh_time() -> u64 {
    103
}

fn default_check_interval_lower() -> u64 {
    41
}

fn default_check_interval_upper() -> u64 {
    59
}

fn default_max_parallel() -> usize {
    10
}

fn default_probe_timeout() -> u64 {
    15
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            refresh_time_secs: default_refresh_time(),
            check_interval_lower_secs: default_check_interval_lower(),
            check_interval_upper_secs: default_check_interval_upper(),
            max_parallel_connections: default_max_parallel(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Ticket settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSettings {
    #[serde(default = "default_one")]
    pub amount: u64,

    /// 1 means every ticket wins, N means one in N
    #[serde(default = "default_one")]
    pub win_prob_inverse: u64,

    #[serde(default = "default_one")]
    pub epoch: u64,

    #[serde(default = "default_one")]
    pub channel_iteration: u64,
}

fn default_one() -> u64 {
    1
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self {
            amount: 1,
            win_prob_inverse: 1,
            epoch: 1,
            channel_iteration: 1,
        }
    }
}

/// Ticket store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Seconds a pending record waits for its acknowledgement
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Acknowledged tickets kept until taken for redemption
    #[serde(default = "default_max_acknowledged")]
    pub max_acknowledged: usize,
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_pending() -> usize {
    10000
}

fn default_max_acknowledged() -> usize {
    10000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            max_pending: default_max_pending(),
            max_acknowledged: default_max_acknowledged(),
        }
    }
}

/// Node settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// How often expired pending records are pruned
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,

    /// Buffered incoming messages and acknowledgement events. Once full,
    /// new ones are dropped until the receiver catches up.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_prune_interval() -> u64 {
    60
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            prune_interval_secs: default_prune_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.heartbeat.refresh_time_secs, 103);
        assert_eq!(settings.heartbeat.max_parallel_connections, 10);
        assert_eq!(settings.store.max_pending, 10000);
        assert_eq!(settings.tickets.win_prob_inverse, 1);
    }

    #[test]
    fn test_defaults_match_component_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.heartbeat_config(), HeartbeatConfig::default());
        assert_eq!(settings.ticket_config(), TicketConfig::default());
        assert_eq!(settings.store_config(), StoreConfig::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"heartbeat": {"max_parallel_connections": 3}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.heartbeat.max_parallel_connections, 3);
        assert_eq!(settings.heartbeat.refresh_time_secs, 103);
        assert_eq!(settings.store, StoreSettings::default());
    }

    #[test]
    fn test_zero_parallel_connections_reads_as_one() {
        let mut settings = Settings::default();
        settings.heartbeat.max_parallel_connections = 0;
        assert_eq!(settings.heartbeat_config().max_parallel_connections, 1);

        settings.heartbeat.max_parallel_connections = 4;
        assert_eq!(settings.heartbeat_config().max_parallel_connections, 4);
    }

    #[test]
    fn test_ticket_config_win_prob() {
        let mut settings = Settings::default();
        settings.tickets.win_prob_inverse = 4;
        assert_eq!(settings.ticket_config().win_prob, U256::MAX / U256::from(4u64));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.store.ttl_secs = 120;
        settings.node.prune_interval_secs = 5;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::ParseError(_))
        ));
    }
}
