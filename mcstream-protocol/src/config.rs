//! Parser configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via MCSTREAM_CONFIG)
//! 3. Environment variables
//!
//! Decoders are functions and cannot be written in a file, so the `flags`
//! section names one of the built-in decoders for each flag id:
//!
//! ```yaml
//! readable: true
//! high_water_mark: 1024
//! flags:
//!   1: number
//!   2: json
//! ```

use crate::buffer::DEFAULT_BUFFER_CAPACITY;
use crate::error::ValidationError;
use crate::flags::decoders;
use crate::{DEFAULT_HIGH_WATER_MARK, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_VALUE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "MCSTREAM_CONFIG";

/// Serializable parser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Queue decoded events for the pull side.
    pub readable: bool,
    /// Accept writes.
    pub writable: bool,
    /// Queued events at which `write` starts signalling backpressure.
    pub high_water_mark: usize,
    /// Largest accepted data block in bytes.
    pub max_value_size: usize,
    /// Longest accepted header line in bytes.
    pub max_line_length: usize,
    /// Initial buffer capacity in bytes.
    pub buffer_capacity: usize,
    /// Built-in decoder name by flag id.
    pub flags: BTreeMap<u32, String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            readable: true,
            writable: true,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flags: BTreeMap::new(),
        }
    }
}

impl ParserConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: ParserConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("MCSTREAM_READABLE") {
            self.readable = parse_bool(&v);
        }

        if let Some(v) = var("MCSTREAM_WRITABLE") {
            self.writable = parse_bool(&v);
        }

        if let Some(n) = var("MCSTREAM_HIGH_WATER_MARK").and_then(|v| v.parse().ok()) {
            self.high_water_mark = n;
        }

        if let Some(n) = var("MCSTREAM_MAX_VALUE_SIZE").and_then(|v| v.parse().ok()) {
            self.max_value_size = n;
        }

        if let Some(n) = var("MCSTREAM_MAX_LINE_LENGTH").and_then(|v| v.parse().ok()) {
            self.max_line_length = n;
        }

        if let Some(n) = var("MCSTREAM_BUFFER_CAPACITY").and_then(|v| v.parse().ok()) {
            self.buffer_capacity = n;
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_water_mark == 0 {
            return Err(ConfigError::Validation(
                "high_water_mark must be greater than 0".to_string(),
            ));
        }
        if self.max_value_size == 0 {
            return Err(ConfigError::Validation(
                "max_value_size must be greater than 0".to_string(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Validation(
                "max_line_length must be greater than 0".to_string(),
            ));
        }
        for name in self.flags.values() {
            if decoders::by_name(name).is_none() {
                return Err(ValidationError::NotADecoder(name.clone()).into());
            }
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }
}

fn parse_bool(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("invalid flag decoder: {0}")]
    Flag(#[from] ValidationError),
}
