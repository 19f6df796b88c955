//! MediQueue configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for scheduling weights and check-in cadence
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation of weight and interval values

pub mod checkin;
pub mod resolve;
pub mod schedule;
pub mod validate;

pub use checkin::CheckInConfig;
pub use resolve::{resolve_config_path, resolve_state_path, ConfigSource, ResolvedPath};
pub use schedule::ScheduleConfig;
pub use validate::{validate, ValidationIssue, ValidationResult};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Errors loading or saving configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level MediQueue configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Priority formula weights and caps.
    pub schedule: ScheduleConfig,

    /// Check-in ticker cadence and delivery limits.
    pub checkin: CheckInConfig,
}

impl QueueConfig {
    /// Load configuration from a JSON file, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: QueueConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let report = validate(&config);
        if !report.is_valid() {
            return Err(ConfigError::Invalid(report.to_string()));
        }
        Ok(config)
    }

    /// Load from an optional path, falling back to built-in defaults when
    /// no config file is present.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }
}
