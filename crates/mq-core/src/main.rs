//! MediQueue Core - Triage Waitlist Engine
//!
//! The main entry point for mq-core, handling:
//! - Admission of assessed patients into the shared waitlist
//! - Queue snapshots, position lookups, and voluntary demotions
//! - Check-in responses with escalation on worsening
//! - One-shot check-in passes against a local state file
//!
//! The queue state lives in a JSON file (see `--state`); every command
//! opens it, runs one operation through the scheduling core, and saves.

use clap::{Args, Parser, Subcommand, ValueEnum};
use mq_common::{EntryId, EntryStatus, Error, OwnerId, Result, StructuredError};
use mq_config::{resolve_config_path, resolve_state_path, validate, QueueConfig};
use mq_core::checkin::{process_tick, TickerState};
use mq_core::exit_codes::ExitCode;
use mq_core::logging::{init_logging, LogConfig, LogLevel};
use mq_core::notify::{NotificationPayload, NotificationSink, SinkError};
use mq_core::scheduler::QueueScheduler;
use mq_core::store::{CheckInAnswer, CheckInResponse, QueueStore};
use mq_core::triage;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// MediQueue Core - triage waitlist scheduling and check-ins
#[derive(Parser)]
#[command(name = "mq-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the queue state file
    #[arg(long, global = true, env = "MEDIQUEUE_STATE")]
    state: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, global = true, env = "MEDIQUEUE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Admit an assessed patient into the waitlist
    Admit {
        /// Owner token for the patient
        #[arg(long)]
        owner: String,

        /// Assessed severity score in [1,10]
        #[arg(long)]
        severity: f64,

        /// Symptom summary, screened for emergency keywords
        #[arg(long)]
        summary: Option<String>,
    },

    /// Print the ordered queue snapshot
    Queue,

    /// Report an owner's current position after a fresh scheduling pass
    Position {
        #[arg(long)]
        owner: String,
    },

    /// Voluntarily lower an owner's priority
    Lower {
        #[arg(long)]
        owner: String,
    },

    /// Record a check-in response ("worse" escalates severity)
    CheckIn {
        #[arg(long)]
        owner: String,

        /// Entry id the response belongs to
        #[arg(long)]
        entry: String,

        /// One of: better, same, worse
        #[arg(long)]
        response: CheckInAnswer,
    },

    /// Remove an owner's waiting entry from the queue
    Withdraw {
        #[arg(long)]
        owner: String,

        /// Mark the entry cancelled instead of completed
        #[arg(long)]
        cancel: bool,
    },

    /// Run one check-in pass, printing prompts to stdout
    Tick,

    /// Validate the configuration file
    Check,
}

/// Sink used by `tick`: delivery means printing the prompt as a JSON line.
struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn deliver(
        &self,
        owner: &OwnerId,
        payload: &NotificationPayload,
    ) -> std::result::Result<(), SinkError> {
        let line = serde_json::to_string(&json!({ "owner": owner, "payload": payload }))
            .map_err(|e| SinkError::Failed(e.to_string()))?;
        println!("{line}");
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    let level = (cli.global.verbose > 0).then(|| LogLevel::from_verbosity(cli.global.verbose));
    init_logging(&LogConfig::from_env(level, None));

    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err, cli.global.format);
            ExitCode::from_error(&err)
        }
    };
    std::process::exit(code.as_i32());
}

fn run(cli: &Cli) -> Result<ExitCode> {
    if let Commands::Check = cli.command {
        return run_check(cli);
    }

    let config_path = resolve_config_path(cli.global.config.as_deref());
    let config = match QueueConfig::load_or_default(config_path.path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ Configuration Error\n  Reason: {err}");
            return Ok(ExitCode::ConfigError);
        }
    };

    let state_path = resolve_state_path(cli.global.state.as_deref())
        .path
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not resolve a state file path; pass --state",
            ))
        })?;
    let store = Arc::new(QueueStore::open(&state_path)?);
    let scheduler = QueueScheduler::new(Arc::clone(&store), config.schedule.clone());
    let format = cli.global.format;

    match &cli.command {
        Commands::Admit {
            owner,
            severity,
            summary,
        } => {
            let owner = parse_owner(owner)?;
            let entry = scheduler.admit(&owner, *severity)?;
            let emergency = triage::is_emergency(summary.as_deref().unwrap_or(""), *severity);
            let recommendation = triage::care_recommendation(entry.category);

            let mut text = format!(
                "admitted {} at position {} ({}, severity {:.1})\n{recommendation}",
                entry.id, entry.position, entry.category, entry.severity_score
            );
            if emergency {
                text.push_str("\nEMERGENCY indicators detected - do not wait in the queue.");
            }
            emit(
                format,
                &json!({
                    "entry": entry,
                    "emergency": emergency,
                    "care_recommendation": recommendation,
                }),
                text,
            );
            Ok(ExitCode::Clean)
        }

        Commands::Queue => {
            let state = scheduler.queue_state();
            let text = if state.is_empty() {
                "queue is empty".to_string()
            } else {
                state
                    .iter()
                    .map(|item| {
                        format!(
                            "{:>3}. {} (severity {:.1}, {}, waited {:.1} min, est. {} min)",
                            item.position,
                            item.owner_id,
                            item.severity_score,
                            item.category,
                            item.wait_minutes,
                            item.estimated_wait_minutes
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            emit(format, &json!({ "queue": state }), text);
            Ok(ExitCode::Clean)
        }

        Commands::Position { owner } => {
            let owner = parse_owner(owner)?;
            let position = scheduler.position_of(&owner);
            let text = match position {
                Some(p) => format!("{owner} is at position {p}"),
                None => format!("no waiting entry for {owner}"),
            };
            emit(format, &json!({ "owner": owner, "position": position }), text);
            Ok(ExitCode::Clean)
        }

        Commands::Lower { owner } => {
            let owner = parse_owner(owner)?;
            let lowered = scheduler.self_lower(&owner)?;
            let position = lowered.then(|| scheduler.position_of(&owner)).flatten();
            let text = if lowered {
                match position {
                    Some(p) => format!("{owner} lowered to position {p}"),
                    None => format!("{owner} lowered"),
                }
            } else {
                format!("no waiting entry for {owner}")
            };
            emit(
                format,
                &json!({ "owner": owner, "lowered": lowered, "position": position }),
                text,
            );
            Ok(ExitCode::Clean)
        }

        Commands::CheckIn {
            owner,
            entry,
            response,
        } => {
            let owner = parse_owner(owner)?;
            let entry_id = EntryId::parse(entry).ok_or_else(|| Error::EntryNotFound {
                entry_id: entry.clone(),
            })?;
            let check_in = CheckInResponse {
                owner_id: owner,
                entry_id,
                response: *response,
            };
            let updated = scheduler.record_check_in_response(&check_in)?;
            let text = format!(
                "recorded '{}' for {} (severity {:.1}, position {})",
                response, updated.id, updated.severity_score, updated.position
            );
            emit(format, &json!({ "entry": updated, "response": response }), text);
            Ok(ExitCode::Clean)
        }

        Commands::Withdraw { owner, cancel } => {
            let owner = parse_owner(owner)?;
            let terminal = if *cancel {
                EntryStatus::Cancelled
            } else {
                EntryStatus::Completed
            };
            let entry = scheduler.withdraw_as_at(&owner, terminal, chrono::Utc::now())?;
            emit(
                format,
                &json!({ "entry": entry }),
                format!("{owner} withdrawn ({terminal})"),
            );
            Ok(ExitCode::Clean)
        }

        Commands::Tick => {
            let sink: Arc<dyn NotificationSink> = Arc::new(StdoutSink);
            let mut state = TickerState::new(config.checkin.event_ring_capacity);
            let outcome = process_tick(
                &store,
                &sink,
                &config.checkin,
                &mut state,
                chrono::Utc::now(),
            );
            emit(
                format,
                &json!({ "outcome": outcome }),
                format!(
                    "tick complete: {} due, {} delivered, {} failed",
                    outcome.due, outcome.delivered, outcome.failed
                ),
            );
            Ok(ExitCode::Clean)
        }

        Commands::Check => unreachable!("handled above"),
    }
}

fn run_check(cli: &Cli) -> Result<ExitCode> {
    let resolved = resolve_config_path(cli.global.config.as_deref());
    let format = cli.global.format;

    let Some(path) = resolved.path else {
        emit(
            format,
            &json!({ "valid": true, "source": "builtin default", "issues": [] }),
            "no config file found; builtin defaults are in effect".to_string(),
        );
        return Ok(ExitCode::Clean);
    };

    let raw = std::fs::read_to_string(&path)?;
    let config: QueueConfig = match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ Configuration Error\n  Reason: {}: {err}", path.display());
            return Ok(ExitCode::ConfigError);
        }
    };

    let report = validate(&config);
    emit(
        format,
        &json!({
            "valid": report.is_valid(),
            "source": resolved.source.to_string(),
            "path": path,
            "issues": report.issues,
        }),
        if report.is_valid() {
            format!("{} is valid", path.display())
        } else {
            format!("{}: {report}", path.display())
        },
    );

    if report.is_valid() {
        Ok(ExitCode::Clean)
    } else {
        Ok(ExitCode::ConfigError)
    }
}

fn parse_owner(raw: &str) -> Result<OwnerId> {
    OwnerId::parse(raw).ok_or(Error::InvalidOwner)
}

fn emit(format: OutputFormat, value: &serde_json::Value, text: String) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text => println!("{text}"),
    }
}

fn report_error(err: &Error, format: OutputFormat) {
    match format {
        OutputFormat::Json => eprintln!("{}", StructuredError::from(err).to_json()),
        OutputFormat::Text => eprintln!("✗ {}\n  Reason: {err}", err.headline()),
    }
}
