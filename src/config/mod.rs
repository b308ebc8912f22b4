/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Stream configuration loading and management.
//!
//! The expected YAML structure is:
//! ```yaml
//! stream:
//!   interface: "eth0"
//!   tx_interval_us: 10000
//!   stream_class: "A"        # "A", "B" or "none" (best-effort)
//!   port_rate_bps: 100000000
//!   max_mtu: 1500
//! sensors:
//!   imu_rate_hz: 100
//!   gyro_rate_hz: 100
//! ```
//!
//! Partial configs are accepted gracefully; missing values fall back to the
//! defaults below, which match the reference deployment (100 Mbit/s port,
//! 10 ms transmit interval, Class A).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::shaper::StreamClass;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
struct StreamConfigFile {
    #[serde(default)]
    stream: StreamEntry,
    #[serde(default)]
    sensors: SensorsEntry,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StreamEntry {
    interface: String,
    tx_interval_us: u64,
    /// `"A"`, `"B"` or `"none"`.
    stream_class: String,
    port_rate_bps: u64,
    max_mtu: usize,
}

impl Default for StreamEntry {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            tx_interval_us: 10_000,
            stream_class: "A".to_string(),
            port_rate_bps: 100_000_000,
            max_mtu: 1500,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SensorsEntry {
    imu_rate_hz: u32,
    gyro_rate_hz: u32,
}

impl Default for SensorsEntry {
    fn default() -> Self {
        Self {
            imu_rate_hz: 100,
            gyro_rate_hz: 100,
        }
    }
}

// ── Public data structures ────────────────────────────────────────────────────

/// Validated node configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Network interface the packet socket binds to.
    pub interface: String,
    /// Transmission interval, nanoseconds.
    pub tx_interval_ns: u64,
    /// SR class of the stream; `None` = best-effort (no VLAN priority).
    pub stream_class: Option<StreamClass>,
    /// Port transmit rate, bits per second.
    pub port_rate_bps: u64,
    /// Interface MTU, bytes.
    pub max_mtu: usize,
    /// IMU producer trigger rate.
    pub imu_rate_hz: u32,
    /// Gyroscope producer trigger rate.
    pub gyro_rate_hz: u32,
}

impl StreamConfig {
    /// Producer trigger period for the IMU group.
    pub fn imu_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.imu_rate_hz.max(1) as u64)
    }

    /// Producer trigger period for the gyroscope group.
    pub fn gyro_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.gyro_rate_hz.max(1) as u64)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        // Mirrors the documented defaults above.
        StreamConfig::from_file_repr(StreamConfigFile::default())
            .expect("builtin defaults are valid")
    }
}

impl StreamConfig {
    fn from_file_repr(file: StreamConfigFile) -> Result<Self> {
        let stream_class = match file.stream.stream_class.as_str() {
            "none" | "None" | "" => None,
            other => Some(
                other
                    .parse::<StreamClass>()
                    .with_context(|| format!("invalid stream_class: '{other}'"))?,
            ),
        };
        if file.stream.tx_interval_us == 0 {
            bail!("tx_interval_us must be non-zero");
        }

        Ok(Self {
            interface: file.stream.interface,
            tx_interval_ns: file.stream.tx_interval_us * 1_000,
            stream_class,
            port_rate_bps: file.stream.port_rate_bps,
            max_mtu: file.stream.max_mtu,
            imu_rate_hz: file.sensors.imu_rate_hz,
            gyro_rate_hz: file.sensors.gyro_rate_hz,
        })
    }
}

// ── StreamConfigManager ───────────────────────────────────────────────────────

/// Loads and manages the stream configuration from a YAML file.
#[derive(Debug, Default)]
pub struct StreamConfigManager {
    config: Option<StreamConfig>,
}

impl StreamConfigManager {
    /// Creates a new, empty `StreamConfigManager`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces any previously loaded configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or a field fails validation.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading stream configuration from: {}", path.display());
        self.config = None;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: StreamConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let config = StreamConfig::from_file_repr(file)?;
        debug!(?config, "stream configuration parsed");
        self.config = Some(config);
        Ok(())
    }

    /// The loaded configuration, or the builtin defaults when no file was
    /// supplied.
    pub fn effective(&self) -> StreamConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Returns `true` after a successful [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.config.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
