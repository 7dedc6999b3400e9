//! Blueprint - AI design interview CLI
//!
//! Drives a multi-turn design interview against a remote assistant, keeps a
//! durable transcript of every session, and turns a finished interview into
//! three project documents: PRD.md, CLAUDE.md and README.md.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, ArgAction, Command, value_parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod conversation;
mod core;
mod providers;
mod store;

use crate::core::{ConfirmGate, GenerateError, GenerationReport, SessionStatus};
use config::Config;
use conversation::record::{DesignRecord, ProjectType};
use conversation::SessionMode;

/// Interactive "design complete?" prompt on the terminal.
struct StdinGate;

#[async_trait::async_trait]
impl ConfirmGate for StdinGate {
    async fn confirm_complete(&self, record: &DesignRecord) -> bool {
        let name = record.project_name.clone().unwrap_or_else(|| "your project".into());
        tokio::task::spawn_blocking(move || {
            use std::io::{BufRead, Write};
            print!("Is the design for {} complete? [y/N] ", name);
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).ok();
            matches!(line.trim(), "y" | "Y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

fn print_report(report: &GenerationReport) {
    for (kind, path) in &report.written {
        println!("  wrote {} -> {}", kind, path.display());
    }
    for failure in &report.failures {
        eprintln!("  FAILED {}: {}", failure.kind, failure.reason);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blueprint_ai=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Command::new("blueprint")
        .version(env!("CARGO_PKG_VERSION"))
        .about("AI design interview: talk through a project, get its documents")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("design")
                .about("Start an interview session")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Project name, if already decided"),
                )
                .arg(
                    Arg::new("type")
                        .long("type")
                        .help("Project type: web, cli, api, mobile, desktop, library or other"),
                )
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .action(ArgAction::SetTrue)
                        .help("Run without terminal prompts, bounded by the turn budget"),
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to write the generated documents"),
                )
                .arg(
                    Arg::new("skip-docs")
                        .long("skip-docs")
                        .action(ArgAction::SetTrue)
                        .help("Stop after the interview; generate documents later with 'docs'"),
                ),
        )
        .subcommand(Command::new("sessions").about("List stored interview sessions"))
        .subcommand(
            Command::new("docs")
                .about("Generate documents from a stored session")
                .arg(Arg::new("session").required(true).help("Session id, as shown by 'sessions'"))
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to write the generated documents"),
                ),
        );

    let config = Config::from_env()?;
    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("design", args)) => {
            let name = args.get_one::<String>("name").cloned();
            let project_type = match args.get_one::<String>("type") {
                Some(raw) => Some(raw.parse::<ProjectType>().map_err(anyhow::Error::msg)?),
                None => None,
            };
            let mode = if args.get_flag("non-interactive") {
                SessionMode::NonInteractive
            } else {
                SessionMode::Interactive
            };
            let output_dir = args.get_one::<PathBuf>("output-dir").cloned().unwrap();
            let skip_docs = args.get_flag("skip-docs");

            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\ninterrupted; saving the session...");
                    signal_token.cancel();
                }
            });

            let gate: Option<Arc<dyn ConfirmGate>> = match mode {
                SessionMode::Interactive => Some(Arc::new(StdinGate)),
                SessionMode::NonInteractive => None,
            };
            let observer: crate::core::MessageObserver = Box::new(|message| {
                if let Some(text) = message.as_text() {
                    println!("{}", text);
                }
            });

            let outcome = commands::start_session(
                &config,
                name,
                project_type,
                mode,
                gate,
                Some(observer),
                cancel,
            )
            .await?;

            let session_id = outcome
                .transcript_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();

            tracing::info!(
                "session {} gathered {} answers over {} turns",
                outcome.conversation.id,
                outcome.conversation.record.answers.len(),
                outcome.conversation.turns.len(),
            );

            match outcome.status {
                SessionStatus::Cancelled => {
                    println!("Session cancelled; transcript saved as {}", session_id);
                    return Ok(());
                }
                SessionStatus::TurnLimitReached => {
                    println!("Turn budget reached; continuing with what was gathered.")
                }
                SessionStatus::Completed => {}
            }

            if skip_docs {
                println!("Session saved as {}", session_id);
                return Ok(());
            }

            match commands::generate_documents(&config, &session_id, &output_dir).await {
                Ok(report) => print_report(&report),
                Err(commands::CommandError::Generate(GenerateError::Validation(why))) => {
                    println!(
                        "Not enough gathered yet to generate documents ({}); \
                         the session is saved as {}",
                        why, session_id
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Some(("sessions", _)) => {
            let sessions = commands::list_sessions(&config)?;
            if sessions.is_empty() {
                println!("No stored sessions in {}", config.data_dir.display());
            }
            for summary in sessions {
                let id = summary
                    .path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {} messages  {}",
                    id,
                    summary.started_at.format("%Y-%m-%d %H:%M"),
                    summary.message_count,
                    summary.project_name.as_deref().unwrap_or("(unnamed)"),
                );
            }
        }
        Some(("docs", args)) => {
            let session = args.get_one::<String>("session").unwrap();
            let output_dir = args.get_one::<PathBuf>("output-dir").cloned().unwrap();

            let report = commands::generate_documents(&config, session, &output_dir).await?;
            print_report(&report);
        }
        _ => unreachable!("arg_required_else_help"),
    }

    Ok(())
}
