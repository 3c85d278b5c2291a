// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration file.
//!
//! The config file is TOML. It carries only static bring-up settings (device
//! paths, bus parameters, socket paths); tunables that change at runtime live
//! in confd and are read through [`crate::confd`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Radio settings
    pub radio: RadioSection,

    /// Network addressing
    pub network: NetworkSection,

    /// Local RPC server settings
    pub rpc: RpcSection,

    /// Runtime configuration daemon settings
    #[serde(default)]
    pub confd: ConfdSection,
}

/// `[radio]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RadioSection {
    /// Transport used to reach the radio
    pub transport: TransportConfig,

    /// General radio behaviour knobs
    #[serde(default)]
    pub general: RadioGeneral,
}

/// `[radio.transport]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Transport type; currently only `spidev`
    #[serde(rename = "type")]
    pub kind: String,

    /// SPI device node path
    pub file: PathBuf,

    /// SPI bus frequency, in Hz
    pub freq: u32,

    /// SPI mode (0-3)
    pub mode: u8,

    /// Interrupt line, as `gpiochip:pin`
    pub irq: String,

    /// Reset line, as `gpiochip:pin`
    pub reset: Option<String>,
}

/// `[radio.general]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RadioGeneral {
    /// Status poll interval in ms; 0 or absent disables polling
    #[serde(default)]
    pub poll_interval_ms: u64,

    /// Interrupt watchdog check interval, in ms
    #[serde(default = "default_irq_watchdog_interval")]
    pub irq_watchdog_interval_ms: u64,
}

impl Default for RadioGeneral {
    fn default() -> Self {
        Self {
            poll_interval_ms: 0,
            irq_watchdog_interval_ms: default_irq_watchdog_interval(),
        }
    }
}

fn default_irq_watchdog_interval() -> u64 {
    50
}

/// `[network]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    /// Address assignments
    pub addresses: AddressesSection,
}

/// `[network.addresses]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressesSection {
    /// 16-bit short address of this coordinator
    pub mine: u16,
}

/// `[rpc]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSection {
    /// Filesystem path for the listening socket
    pub listen: PathBuf,
}

/// `[confd]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfdSection {
    /// Path of the confd daemon's local socket
    #[serde(default = "default_confd_socket")]
    pub socket: PathBuf,
}

impl Default for ConfdSection {
    fn default() -> Self {
        Self {
            socket: default_confd_socket(),
        }
    }
}

fn default_confd_socket() -> PathBuf {
    PathBuf::from("/var/run/confd.sock")
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.radio.transport.mode > 3 {
            return Err(ConfigError::Invalid(format!(
                "radio.transport.mode must be in [0, 3], got {}",
                self.radio.transport.mode
            )));
        }
        if self.radio.transport.freq == 0 {
            return Err(ConfigError::Invalid(
                "radio.transport.freq must be non-zero".into(),
            ));
        }
        if self.rpc.listen.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("rpc.listen must not be empty".into()));
        }
        Ok(())
    }
}
