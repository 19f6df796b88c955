//! Structured logging foundation for mq-core.
//!
//! Dual-mode logging on stderr:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSON lines for service/agent workflows
//!
//! stdout stays reserved for command payloads. Respects the environment
//! variables `MEDIQUEUE_LOG` (level), `RUST_LOG` (full filter), and
//! `MEDIQUEUE_LOG_FORMAT` (`human` | `json`).

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const ENV_LOG_LEVEL: &str = "MEDIQUEUE_LOG";
const ENV_LOG_FORMAT: &str = "MEDIQUEUE_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count to a level (0 = warn, 1 = info, 2 = debug, 3+ = trace).
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LogConfig {
    /// Build a config from the environment, with optional overrides
    /// (typically from CLI flags) taking precedence.
    pub fn from_env(level: Option<LogLevel>, format: Option<LogFormat>) -> Self {
        let env_level = std::env::var(ENV_LOG_LEVEL)
            .ok()
            .and_then(|v| match v.to_ascii_lowercase().as_str() {
                "error" => Some(LogLevel::Error),
                "warn" => Some(LogLevel::Warn),
                "info" => Some(LogLevel::Info),
                "debug" => Some(LogLevel::Debug),
                "trace" => Some(LogLevel::Trace),
                _ => None,
            });

        let env_format = std::env::var(ENV_LOG_FORMAT)
            .ok()
            .and_then(|v| match v.to_ascii_lowercase().as_str() {
                "human" => Some(LogFormat::Human),
                "json" | "jsonl" => Some(LogFormat::Json),
                _ => None,
            });

        LogConfig {
            level: level.or(env_level).unwrap_or_default(),
            format: format.or(env_format).unwrap_or_default(),
        }
    }
}

/// Initialize the logging subsystem.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mq_core={level},mq_config={level},mq_common={level}",
            level = config.level
        ))
    });

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init();
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_writer(std::io::stderr);

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init();
        }
    }
}
