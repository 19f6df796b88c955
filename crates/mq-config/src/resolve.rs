//! Configuration and state-file path resolution.
//!
//! Resolution order: CLI arguments → environment variables → XDG paths → defaults.

use std::path::{Path, PathBuf};

/// Where a resolved path came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in (or defaulted under) an XDG directory.
    XdgPath,

    /// Using built-in defaults (no file).
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgPath => write!(f, "XDG path"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A resolved path plus its provenance, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPath {
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Environment variable names.
const ENV_CONFIG_PATH: &str = "MEDIQUEUE_CONFIG";
const ENV_CONFIG_DIR: &str = "MEDIQUEUE_CONFIG_DIR";
const ENV_STATE_PATH: &str = "MEDIQUEUE_STATE";

/// Standard file names.
const CONFIG_FILENAME: &str = "config.json";
const STATE_FILENAME: &str = "queue.json";

/// Application name for XDG directories.
const APP_NAME: &str = "mediqueue";

/// Resolve the config file path.
///
/// Resolution order:
/// 1. Explicit CLI path (if provided)
/// 2. MEDIQUEUE_CONFIG environment variable
/// 3. MEDIQUEUE_CONFIG_DIR environment variable + `config.json`
/// 4. XDG config directory (~/.config/mediqueue/config.json), if the file exists
/// 5. Built-in defaults (None)
pub fn resolve_config_path(cli_path: Option<&Path>) -> ResolvedPath {
    if let Some(p) = cli_path {
        return ResolvedPath {
            path: Some(p.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        if !p.is_empty() {
            return ResolvedPath {
                path: Some(PathBuf::from(p)),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        if !dir.is_empty() {
            return ResolvedPath {
                path: Some(PathBuf::from(dir).join(CONFIG_FILENAME)),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join(APP_NAME).join(CONFIG_FILENAME);
        if candidate.exists() {
            return ResolvedPath {
                path: Some(candidate),
                source: ConfigSource::XdgPath,
            };
        }
    }

    ResolvedPath::default()
}

/// Resolve the queue state file path.
///
/// Resolution order:
/// 1. Explicit CLI path (if provided)
/// 2. MEDIQUEUE_STATE environment variable
/// 3. XDG data directory (~/.local/share/mediqueue/queue.json)
///
/// Unlike the config file, the state file path always resolves to a
/// concrete location — the store creates it on first save.
pub fn resolve_state_path(cli_path: Option<&Path>) -> ResolvedPath {
    if let Some(p) = cli_path {
        return ResolvedPath {
            path: Some(p.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(p) = std::env::var(ENV_STATE_PATH) {
        if !p.is_empty() {
            return ResolvedPath {
                path: Some(PathBuf::from(p)),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Some(data_dir) = dirs::data_local_dir() {
        return ResolvedPath {
            path: Some(data_dir.join(APP_NAME).join(STATE_FILENAME)),
            source: ConfigSource::XdgPath,
        };
    }

    ResolvedPath::default()
}
