//! Terminal client for timeslicer.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use timeslicer::timekey::format_minutes;
use timeslicer::view::{daily_rows, weekly_rows};
use timeslicer::{
    AppState, CommitOutcome, SyncEngine, SyncScheduler, TaskId, TaskKind, TimeslicerConfig, store,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for queued saves before exiting.
const EXIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Track daily habits and weekly time budgets, synced across devices.
#[derive(Parser)]
#[command(name = "timeslicer", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `status`).
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show today's daily tasks and this week's progress.
    Status,

    /// Add a task.
    Add {
        title: String,
        /// Track minutes against a weekly target instead of a daily checkmark.
        #[arg(long)]
        weekly: bool,
    },

    /// Rename a task.
    Rename { id: String, title: String },

    /// Toggle today's done flag of a daily task.
    Done { id: String },

    /// Log minutes against a weekly task (negative to remove).
    Log {
        id: String,
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },

    /// Set a weekly task's target in minutes.
    Target { id: String, minutes: i64 },

    /// Delete a task.
    Delete { id: String },

    /// Write the state as JSON to a file, or stdout.
    Export { path: Option<PathBuf> },

    /// Replace the state with previously exported JSON.
    Import { path: PathBuf },

    /// Keep running, reloading remote state and rolling over at midnight.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("timeslicer=info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(TimeslicerConfig::default_config_path);
    let mut config = TimeslicerConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env_overrides();

    let store = store::from_config(&config)?;
    let engine = Arc::new(SyncEngine::new(store, &config)?);

    let command = cli.command.unwrap_or(Command::Status);
    if let Command::Watch = command {
        return run_watch(engine, &config).await;
    }

    engine.hydrate().await;
    let result = run_command(&engine, command);
    flush_before_exit(&engine).await;
    result
}

fn run_command(engine: &SyncEngine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status | Command::Watch => print_status(engine),
        Command::Add { title, weekly } => {
            let kind = if weekly {
                TaskKind::Weekly
            } else {
                TaskKind::Daily
            };
            match engine.add_task(&title, kind) {
                Some(id) => println!("added {kind} task {} ({})", title.trim(), short_id(&id)),
                None => bail!("task title must not be blank"),
            }
        }
        Command::Rename { id, title } => {
            let id = resolve_id(&engine.snapshot(), &id)?;
            report(engine.update_task_title(&id, &title));
        }
        Command::Done { id } => {
            let id = resolve_id(&engine.snapshot(), &id)?;
            require_kind(&engine.snapshot(), &id, TaskKind::Daily)?;
            let outcome = engine.toggle_daily_done(&id);
            println!("{}", done_message(outcome, &engine.snapshot(), &id));
        }
        Command::Log { id, minutes } => {
            let id = resolve_id(&engine.snapshot(), &id)?;
            require_kind(&engine.snapshot(), &id, TaskKind::Weekly)?;
            let outcome = engine.add_weekly_minutes(&id, minutes);
            println!("{}", log_message(outcome, &engine.snapshot(), &id));
        }
        Command::Target { id, minutes } => {
            let id = resolve_id(&engine.snapshot(), &id)?;
            require_kind(&engine.snapshot(), &id, TaskKind::Weekly)?;
            report(engine.set_weekly_target(&id, minutes));
        }
        Command::Delete { id } => {
            let id = resolve_id(&engine.snapshot(), &id)?;
            report(engine.delete_task(&id));
        }
        Command::Export { path } => {
            let json = engine.export_json()?;
            match path {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("exported to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Import { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            report(engine.import_json(&text)?);
        }
    }
    Ok(())
}

async fn run_watch(engine: Arc<SyncEngine>, config: &TimeslicerConfig) -> anyhow::Result<()> {
    let (scheduler, _triggers) = SyncScheduler::new(Arc::clone(&engine), &config.sync);
    let shutdown = CancellationToken::new();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            ctrl_c.cancel();
        }
    });

    let handle = scheduler.run(shutdown);
    println!("Watching for changes. Press Ctrl+C to stop.");
    handle.await.context("sync loop panicked")?;
    flush_before_exit(&engine).await;
    Ok(())
}

async fn flush_before_exit(engine: &SyncEngine) {
    if tokio::time::timeout(EXIT_FLUSH_TIMEOUT, engine.flush())
        .await
        .is_err()
        || engine.is_save_in_progress()
    {
        warn!("exiting with a save still in progress; recent changes may not be stored");
    }
}

const UNCHANGED: &str = "nothing changed";

fn report(outcome: CommitOutcome) {
    println!("{}", if outcome.changed() { "ok" } else { UNCHANGED });
}

fn done_message(outcome: CommitOutcome, doc: &AppState, id: &str) -> &'static str {
    if !outcome.changed() {
        UNCHANGED
    } else if doc.is_done_today(id) {
        "done today"
    } else {
        "not done yet"
    }
}

fn log_message(outcome: CommitOutcome, doc: &AppState, id: &str) -> String {
    if !outcome.changed() {
        return UNCHANGED.to_owned();
    }
    format!(
        "{} / {}",
        format_minutes(doc.spent_min(id)),
        format_minutes(doc.target_min(id))
    )
}

/// Accept a full id or a unique prefix of one.
fn resolve_id(state: &AppState, wanted: &str) -> anyhow::Result<TaskId> {
    let wanted = wanted.trim();
    if wanted.is_empty() {
        bail!("task id must not be blank");
    }
    if let Some(task) = state.task(wanted) {
        return Ok(task.id.clone());
    }

    let matches: Vec<&TaskId> = state
        .tasks
        .iter()
        .map(|t| &t.id)
        .filter(|id| id.starts_with(wanted))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).clone()),
        [] => bail!("no task with id {wanted}"),
        _ => bail!("id prefix {wanted} matches {} tasks", matches.len()),
    }
}

fn require_kind(state: &AppState, id: &str, kind: TaskKind) -> anyhow::Result<()> {
    match state.task(id) {
        Some(task) if task.kind == kind => Ok(()),
        Some(task) => bail!("{} is a {} task", task.title, task.kind),
        None => bail!("no task with id {id}"),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn print_status(engine: &SyncEngine) {
    let doc = engine.snapshot();
    let now = engine.now();
    let zone = engine.zone();

    println!("Today ({})", doc.today_key);
    let daily = daily_rows(&doc, now, zone);
    if daily.is_empty() {
        println!("  No daily tasks yet.");
    }
    for row in daily {
        let mark = if row.done { 'x' } else { ' ' };
        println!("  [{mark}] {}  {}  ({})", short_id(&row.id), row.title, row.subtitle());
    }

    println!();
    println!("This week ({})", doc.week_key);
    let weekly = weekly_rows(&doc, now, zone);
    if weekly.is_empty() {
        println!("  No weekly tasks yet.");
    }
    for row in weekly {
        println!(
            "  {}  {}  {}  {}",
            short_id(&row.id),
            row.title,
            row.subtitle(),
            row.pace
        );
    }
}
