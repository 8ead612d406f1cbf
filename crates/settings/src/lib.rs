//! MixCraft Settings
//!
//! Node configuration stored as a JSON file.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//! use mixcraft_settings::Settings;
//!
//! let path = PathBuf::from("/tmp/mixcraft/settings.json");
//! let mut settings = Settings::load_from(&path)?;
//! settings.heartbeat.max_parallel_connections = 4;
//! settings.save_to(&path)?;
//! # Ok::<(), mixcraft_settings::SettingsError>(())
//! ```

mod config;

pub use config::{HeartbeatSettings, NodeSettings, Settings, StoreSettings, TicketSettings};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
