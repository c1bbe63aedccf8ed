//! Engine configuration
//!
//! Construction-time settings for the engine: output parameters, arena
//! capacity, memory-budget ceilings, and device selection. Loadable from a
//! TOML file with command-line overrides applied by the binary.

use crate::audio::types::OutputConfig;
use crate::budget::BudgetConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Default arena capacity: 128 KiB of per-callback scratch.
pub const DEFAULT_ARENA_CAPACITY: usize = 128 * 1024;

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requested output format
    pub output: OutputConfig,

    /// Frame arena capacity in bytes
    pub arena_capacity: usize,

    /// Memory budget ceilings
    pub budget: BudgetConfig,

    /// Output device name (None = default device)
    pub device: Option<String>,

    /// Whether to open an output device at initialize. Disabled for
    /// headless use (offline rendering, tests) where the host drives
    /// `render` itself.
    pub enable_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            budget: BudgetConfig::default(),
            device: None,
            enable_output: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No configuration file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;

        info!(
            "Loaded configuration from {}: {} Hz, {} ch, buffer {}",
            path.display(),
            config.output.sample_rate,
            config.output.channels,
            config.output.buffer_size
        );
        Ok(config)
    }
}
