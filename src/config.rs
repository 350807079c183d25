//! Configuration management for ensemble-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`ENSEMBLE_EMU_NUM_CORES`, ...)
//! 2. Project-local config file (`./ensemble-emu.toml`)
//! 3. User config file (`~/.config/ensemble-emu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # ensemble-emu.toml
//! num_cores = 4
//! num_partitions = 4
//! config_port = "icap"
//! arbiter_priority = "rotating"
//! default_timeout_cycles = 1000000
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control::arbiter::PriorityScheme;
use crate::device::config_port::ConfigPortKind;
use crate::device::platform_spec::{BITSTREAM_HEADER_WORDS, MAX_CORES};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Invalid platform configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("platform needs at least one core")]
    NoCores,
    #[error("{0} cores requested, at most 16 fit the interrupt controller")]
    TooManyCores(usize),
    #[error("{partitions} partitions but only {cores} cores")]
    TooManyPartitions { partitions: usize, cores: usize },
    #[error("stream buffer of {0} words cannot hold a bitstream header")]
    BufferTooSmall(usize),
}

/// Resolved parameters for building a [`crate::emu::Platform`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Ensemble cores on the bus
    pub num_cores: usize,
    /// Reconfigurable partitions; partition `i` holds core `i`
    pub num_partitions: usize,
    /// DFX stream buffer depth in words
    pub stream_buffer_words: usize,
    pub config_port: ConfigPortKind,
    pub arbiter_priority: PriorityScheme,
    /// TIMEOUT register value after reset
    pub default_timeout_cycles: u32,
    /// AXI4 memory first-beat latency
    pub memory_latency_cycles: u32,
    /// Configuration port busy cycles after each accepted word
    pub port_busy_cycles: u32,
    pub core_quiesce_cycles: u32,
    pub core_startup_cycles: u32,
    /// Audio frame period; 0 disables audio traffic
    pub audio_period_cycles: u64,
    pub audio_burst_beats: usize,
    pub audio_buffer_addr: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            num_cores: 4,
            num_partitions: 4,
            stream_buffer_words: 64,
            config_port: ConfigPortKind::Icap,
            arbiter_priority: PriorityScheme::HighestIndex,
            default_timeout_cycles: 1_000_000,
            memory_latency_cycles: 2,
            port_busy_cycles: 0,
            core_quiesce_cycles: 2,
            core_startup_cycles: 2,
            audio_period_cycles: 0,
            audio_burst_beats: 16,
            audio_buffer_addr: 0x4000_0000,
        }
    }
}

impl PlatformConfig {
    /// Check the structural limits of the platform.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_cores == 0 {
            return Err(ConfigError::NoCores);
        }
        if self.num_cores > MAX_CORES {
            return Err(ConfigError::TooManyCores(self.num_cores));
        }
        if self.num_partitions > self.num_cores {
            return Err(ConfigError::TooManyPartitions {
                partitions: self.num_partitions,
                cores: self.num_cores,
            });
        }
        if self.stream_buffer_words < BITSTREAM_HEADER_WORDS {
            return Err(ConfigError::BufferTooSmall(self.stream_buffer_words));
        }
        Ok(())
    }
}

impl fmt::Display for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cores, {} partitions, {} port, {}-word buffer, {} arbitration",
            self.num_cores,
            self.num_partitions,
            self.config_port,
            self.stream_buffer_words,
            self.arbiter_priority
        )
    }
}

/// ensemble-emu configuration as read from files.
///
/// Every field is optional so that layers only override what they set.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub num_cores: Option<usize>,
    pub num_partitions: Option<usize>,
    pub stream_buffer_words: Option<usize>,
    pub config_port: Option<ConfigPortKind>,
    pub arbiter_priority: Option<PriorityScheme>,
    pub default_timeout_cycles: Option<u32>,
    pub memory_latency_cycles: Option<u32>,
    pub port_busy_cycles: Option<u32>,
    pub core_quiesce_cycles: Option<u32>,
    pub core_startup_cycles: Option<u32>,
    pub audio_period_cycles: Option<u64>,
    pub audio_burst_beats: Option<usize>,
    pub audio_buffer_addr: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `ensemble-emu.toml`
    /// 3. User config `~/.config/ensemble-emu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Read a config file named on the command line.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Resolve against the built-in defaults.
    pub fn platform(&self) -> PlatformConfig {
        let d = PlatformConfig::default();
        PlatformConfig {
            num_cores: self.num_cores.unwrap_or(d.num_cores),
            num_partitions: self.num_partitions.unwrap_or(d.num_partitions),
            stream_buffer_words: self.stream_buffer_words.unwrap_or(d.stream_buffer_words),
            config_port: self.config_port.unwrap_or(d.config_port),
            arbiter_priority: self.arbiter_priority.unwrap_or(d.arbiter_priority),
            default_timeout_cycles: self.default_timeout_cycles.unwrap_or(d.default_timeout_cycles),
            memory_latency_cycles: self.memory_latency_cycles.unwrap_or(d.memory_latency_cycles),
            port_busy_cycles: self.port_busy_cycles.unwrap_or(d.port_busy_cycles),
            core_quiesce_cycles: self.core_quiesce_cycles.unwrap_or(d.core_quiesce_cycles),
            core_startup_cycles: self.core_startup_cycles.unwrap_or(d.core_startup_cycles),
            audio_period_cycles: self.audio_period_cycles.unwrap_or(d.audio_period_cycles),
            audio_burst_beats: self.audio_burst_beats.unwrap_or(d.audio_burst_beats),
            audio_buffer_addr: self.audio_buffer_addr.unwrap_or(d.audio_buffer_addr),
        }
    }

    /// Load user configuration from ~/.config/ensemble-emu/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./ensemble-emu.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("ensemble-emu.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("ensemble-emu.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file, ignoring unreadable ones.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match Self::from_file(path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                log::warn!("{:#}", e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    pub fn merge(&mut self, other: Self) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            num_cores,
            num_partitions,
            stream_buffer_words,
            config_port,
            arbiter_priority,
            default_timeout_cycles,
            memory_latency_cycles,
            port_busy_cycles,
            core_quiesce_cycles,
            core_startup_cycles,
            audio_period_cycles,
            audio_burst_beats,
            audio_buffer_addr
        );
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("ENSEMBLE_EMU_NUM_CORES") {
            match value.parse() {
                Ok(n) => {
                    log::info!("Using ENSEMBLE_EMU_NUM_CORES from environment: {}", n);
                    self.num_cores = Some(n);
                }
                Err(_) => log::warn!("Ignoring ENSEMBLE_EMU_NUM_CORES={:?}", value),
            }
        }
        if let Ok(value) = std::env::var("ENSEMBLE_EMU_CONFIG_PORT") {
            match value.to_ascii_lowercase().as_str() {
                "icap" => self.config_port = Some(ConfigPortKind::Icap),
                "pcap" => self.config_port = Some(ConfigPortKind::Pcap),
                _ => log::warn!("Ignoring ENSEMBLE_EMU_CONFIG_PORT={:?}", value),
            }
        }
        if let Ok(value) = std::env::var("ENSEMBLE_EMU_TIMEOUT") {
            match value.parse() {
                Ok(n) => {
                    log::info!("Using ENSEMBLE_EMU_TIMEOUT from environment: {}", n);
                    self.default_timeout_cycles = Some(n);
                }
                Err(_) => log::warn!("Ignoring ENSEMBLE_EMU_TIMEOUT={:?}", value),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ensemble-emu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# ensemble-emu configuration
# Place this file at ~/.config/ensemble-emu/config.toml or ./ensemble-emu.toml

# Platform shape
num_cores = 4
num_partitions = 4

# DFX controller
stream_buffer_words = 64
config_port = "icap"            # or "pcap"
default_timeout_cycles = 1000000

# Control bus
arbiter_priority = "highest-index"   # or "rotating"

# Timing of the simulated collaborators
memory_latency_cycles = 2
port_busy_cycles = 0
core_quiesce_cycles = 2
core_startup_cycles = 2

# Audio memory traffic (0 disables)
# audio_period_cycles = 256
# audio_burst_beats = 16
"#
        .to_string()
    }
}
