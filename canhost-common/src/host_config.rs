//! Loading of host configuration from TOML
//!
//! A host config file describes which CAN identifiers a host uses, where received samples are
//! stored, and how the session behaves. Every section and field is optional; anything left out
//! keeps the stock value.
//!
//! ```toml
//! device_name = "bench-host"
//!
//! [can]
//! session_id = 0x101
//! sensor_id = 0x107
//! broadcast_id = 0x7DF
//!
//! [transmit]
//! frame_polls = 5000
//! frame_poll_interval_us = 1000
//!
//! [storage]
//! base = 0x30000
//! capacity = 0x10000
//! erase_block = 0x400
//!
//! [session]
//! registry_policy = "keyed"
//! track_outstanding = true
//! ```
use std::path::Path;

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use crate::config::{
    CanIds, LayoutError, SessionConfig, SessionOptions, StorageLayout, TransmitConfig,
};

/// Error returned when loading a host config fails
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// The file could not be read
    #[snafu(display("IO error reading {path}: {source}"))]
    Io {
        /// The file being read
        path: String,
        /// The underlying error
        source: std::io::Error,
    },
    /// The file is not valid TOML, or does not match the expected schema
    #[snafu(display("Error parsing host config: {source}"))]
    Toml {
        /// The underlying error
        source: toml::de::Error,
    },
    /// The storage section describes an unusable layout
    #[snafu(display("Invalid storage layout: {source}"))]
    Layout {
        /// The underlying error
        source: LayoutError,
    },
}

/// Top level host configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// A name for the host, shown when the session starts
    pub device_name: Option<String>,
    /// CAN identifiers
    pub can: CanIds,
    /// Transmit poll budgets
    pub transmit: TransmitConfig,
    /// Sample storage layout
    pub storage: StorageLayout,
    /// Session behavior options
    pub session: SessionOptions,
}

impl HostConfig {
    /// Parse a host config from a TOML string
    pub fn load_from_str(config: &str) -> Result<Self, LoadError> {
        let config: HostConfig = toml::from_str(config).context(TomlSnafu)?;
        config.storage.validate().context(LayoutSnafu)?;
        Ok(config)
    }

    /// Read and parse a host config file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(IoSnafu {
            path: path.display().to_string(),
        })?;
        Self::load_from_str(&text)
    }

    /// Get the session configuration described by this host config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            can: self.can,
            transmit: self.transmit,
            storage: self.storage,
            options: self.session,
        }
    }
}
