// Copyright 2026 Clocktree Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. clocktree.yaml file
//! 3. Environment variables (CLOCKTREE_*)
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{Error, Result};
use crate::temporal::MAX_DISPLAY_DIGITS;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Experiment description limits
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::read(config_path)?;

        // Override with environment variables
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Read the YAML file alone, falling back to defaults.
    fn read(config_path: Option<&Path>) -> Result<Self> {
        // Load from file if specified
        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                return Ok(serde_yaml::from_str(&content)?);
            }
            return Ok(Config::default());
        }

        // Try default locations
        for path in &["clocktree.yaml", "clocktree.yml"] {
            let path = Path::new(path);
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                return Ok(serde_yaml::from_str(&content)?);
            }
        }
        Ok(Config::default())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CLOCKTREE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("CLOCKTREE_LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("CLOCKTREE_DISPLAY_DIGITS") {
            if let Ok(digits) = val.parse() {
                self.resolver.display_digits = digits;
            }
        }
        if let Ok(val) = env::var("CLOCKTREE_DEFAULT_MAX_INSTRUCTIONS") {
            if let Ok(limit) = val.parse() {
                self.resolver.default_max_instructions = Some(limit);
            }
        }
        if let Ok(val) = env::var("CLOCKTREE_MAX_EDGES_PER_DEVICE") {
            if let Ok(limit) = val.parse() {
                self.resolver.max_edges_per_device = limit;
            }
        }
        if let Ok(val) = env::var("CLOCKTREE_MAX_DEVICES") {
            if let Ok(limit) = val.parse() {
                self.limits.max_devices = limit;
            }
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::Config(format!(
                "log format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }
        if self.resolver.display_digits == 0 || self.resolver.display_digits > MAX_DISPLAY_DIGITS {
            return Err(Error::Config(format!(
                "display_digits must be between 1 and {}",
                MAX_DISPLAY_DIGITS
            )));
        }
        if self.resolver.default_max_instructions == Some(0) {
            return Err(Error::Config(
                "default_max_instructions cannot be 0".into(),
            ));
        }
        if self.resolver.max_edges_per_device == 0 {
            return Err(Error::Config("max_edges_per_device cannot be 0".into()));
        }
        if self.limits.max_edges_per_device == 0 {
            return Err(Error::Config("limits.max_edges_per_device cannot be 0".into()));
        }
        if self.limits.max_devices == 0 {
            return Err(Error::Config("max_devices cannot be 0".into()));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Fractional digits shown when printing instants
    #[serde(default = "default_display_digits")]
    pub display_digits: usize,

    /// Instruction capacity assumed for devices that declare none
    #[serde(default)]
    pub default_max_instructions: Option<u64>,

    /// Clock edges one device may need before resolution gives up
    #[serde(default = "default_max_edges_per_device")]
    pub max_edges_per_device: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            display_digits: default_display_digits(),
            default_max_instructions: None,
            max_edges_per_device: default_max_edges_per_device(),
        }
    }
}

fn default_display_digits() -> usize {
    12
}

fn default_max_edges_per_device() -> u64 {
    1 << 24
}

/// Limits applied to experiment descriptions before a tree is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum devices in one tree
    #[serde(default = "default_max_devices")]
    pub max_devices: u32,

    /// Maximum instructions declared on one device
    #[serde(default = "default_max_instructions_per_device")]
    pub max_instructions_per_device: u32,

    /// Maximum clock edges (ramp samples included) declared on one device
    #[serde(default = "default_max_edges_per_device")]
    pub max_edges_per_device: u64,

    /// Maximum waits
    #[serde(default = "default_max_waits")]
    pub max_waits: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_devices: default_max_devices(),
            max_instructions_per_device: default_max_instructions_per_device(),
            max_edges_per_device: default_max_edges_per_device(),
            max_waits: default_max_waits(),
        }
    }
}

fn default_max_devices() -> u32 {
    256
}

fn default_max_instructions_per_device() -> u32 {
    1_000_000
}

fn default_max_waits() -> u32 {
    64
}
