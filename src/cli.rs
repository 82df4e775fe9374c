use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::{
    db::{day_key, Database, Phase, SessionMode},
    settings::{Preferences, SettingsStore},
    summary::{load_day_summary, session_line, DaySummary},
    timer::{TimerController, TimerNotification, TimerSnapshot, TimerStatus},
    utils::format::{format_clock, progress_bar},
};

pub const DATA_DIR_ENV: &str = "FOCUS_FRIENDS_DATA_DIR";
const DB_FILE: &str = "focus_friends.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

const PLUS_SEC: i64 = 5 * 60;
const MINUS_SEC: i64 = -60;

#[derive(Parser)]
#[command(name = "focus-friends")]
#[command(about = "A local focus timer with Pomodoro cycles and daily summaries", long_about = None)]
pub struct Cli {
    /// Directory holding the database and settings
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    #[value(alias = "pomodoro")]
    FixedCycle,
    #[value(alias = "custom")]
    Freeform,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::FixedCycle => SessionMode::FixedCycle,
            ModeArg::Freeform => SessionMode::Freeform,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a focus timer interactively
    Start {
        /// Timer mode (defaults to the saved preference)
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,
        /// Freeform length in minutes (remembered)
        #[arg(long)]
        minutes: Option<u32>,
        /// Freeform tag (remembered)
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show the summary for today or a given day
    Today {
        /// Day key (YYYY-MM-DD)
        #[arg(long)]
        day: Option<String>,
    },
    /// Show the local identity
    Whoami,
    /// Change the display name
    Rename { name: String },
    /// Show or update preferences
    Prefs {
        #[arg(long)]
        work: Option<u32>,
        #[arg(long)]
        short: Option<u32>,
        #[arg(long)]
        long: Option<u32>,
        #[arg(long)]
        cycles: Option<u32>,
        /// Freeform length in minutes
        #[arg(long)]
        length: Option<u32>,
        /// Freeform tag; pass an empty string to clear
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Ring the terminal bell when a phase ends
        #[arg(long)]
        chime: Option<bool>,
    },
    /// Delete the identity and every recorded session
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

pub fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let mut path = dirs::data_dir().ok_or_else(|| anyhow!("Could not find a data directory"))?;
    path.push("focus-friends");
    Ok(path)
}

pub async fn execute(cli: Cli) -> Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir)?;
    let db = Database::new(data_dir.join(DB_FILE))?;
    let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE))?);

    match cli.command {
        Commands::Start { mode, minutes, tag } => {
            if minutes.is_some() || tag.is_some() {
                settings.update(|prefs| {
                    if let Some(minutes) = minutes {
                        prefs.freeform.length_minutes = minutes;
                    }
                    if let Some(tag) = tag {
                        prefs.freeform.tag = Some(tag);
                    }
                })?;
            }
            let mode = mode
                .map(SessionMode::from)
                .unwrap_or(settings.preferences().default_mode);

            let user = db.ensure_user().await?;
            let controller = TimerController::new(db.clone(), settings, user.id);
            run_interactive(&controller, mode).await?;

            print_summary(&load_day_summary(&db, &day_key(Utc::now())).await?);
        }
        Commands::Today { day } => {
            let day = day.unwrap_or_else(|| day_key(Utc::now()));
            print_summary(&load_day_summary(&db, &day).await?);
        }
        Commands::Whoami => {
            let user = db.ensure_user().await?;
            println!("{} {} ({})", user.avatar, user.name, user.id);
        }
        Commands::Rename { name } => {
            let mut user = db.ensure_user().await?;
            user.rename(&name);
            if user.name.is_empty() {
                bail!("display name cannot be empty");
            }
            db.put_user(&user).await?;
            println!("{} {}", user.avatar, user.name);
        }
        Commands::Prefs {
            work,
            short,
            long,
            cycles,
            length,
            tag,
            mode,
            chime,
        } => {
            let prefs = settings.update(|prefs| {
                if let Some(work) = work {
                    prefs.fixed_cycle.work_minutes = work;
                }
                if let Some(short) = short {
                    prefs.fixed_cycle.short_break_minutes = short;
                }
                if let Some(long) = long {
                    prefs.fixed_cycle.long_break_minutes = long;
                }
                if let Some(cycles) = cycles {
                    prefs.fixed_cycle.cycles = cycles;
                }
                if let Some(length) = length {
                    prefs.freeform.length_minutes = length;
                }
                if let Some(tag) = tag {
                    prefs.freeform.tag = Some(tag).filter(|tag| !tag.trim().is_empty());
                }
                if let Some(mode) = mode {
                    prefs.default_mode = mode.into();
                }
                if let Some(chime) = chime {
                    prefs.chime_enabled = chime;
                }
            })?;
            print_preferences(&prefs);
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to clear local data without --yes");
            }
            db.clear_all_data().await?;
            println!("All local data cleared.");
        }
    }

    Ok(())
}

async fn run_interactive(controller: &TimerController, mode: SessionMode) -> Result<()> {
    let mut notifications = controller.subscribe();
    let snapshot = controller.start(mode).await?;

    println!("Controls: [p]ause  [r]esume  [s]top  [+] 5 min  [-] 1 min  (enter after each)");
    render(&snapshot);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(input) = line? else {
                    report_stop(controller).await;
                    break;
                };
                match input.trim() {
                    "p" => {
                        controller.pause().await;
                    }
                    "r" => {
                        if let Err(err) = controller.resume().await {
                            println!("\n{err}");
                        }
                    }
                    "s" | "q" => {
                        report_stop(controller).await;
                        break;
                    }
                    "+" => {
                        controller.adjust(PLUS_SEC).await;
                    }
                    "-" => {
                        controller.adjust(MINUS_SEC).await;
                    }
                    "" => {}
                    other => println!("\nUnknown command '{other}'"),
                }
            }
            notification = notifications.recv() => match notification {
                Ok(TimerNotification::StateChanged(snapshot)) => render(&snapshot),
                Ok(TimerNotification::Chime) => {
                    print!("\x07");
                    let _ = io::stdout().flush();
                }
                Ok(TimerNotification::PhaseChanged { phase, cycle_index, long_break }) => {
                    let label = match (phase, long_break) {
                        (Phase::Work, _) => format!("Cycle {cycle_index} — Work"),
                        (Phase::Break, true) => "Long Break".to_string(),
                        (Phase::Break, false) => "Short Break".to_string(),
                    };
                    println!("\n{label}");
                }
                Ok(TimerNotification::SessionRecorded(session)) => {
                    println!("\nSaved {}", session_line(&session));
                }
                Ok(TimerNotification::RunEnded { .. }) => {
                    println!("\nFinished");
                    break;
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                report_stop(controller).await;
                break;
            }
        }
    }

    Ok(())
}

async fn report_stop(controller: &TimerController) {
    match controller.stop().await {
        Some(session) => println!("\nSaved {}", session_line(&session)),
        None => println!("\nStopped (nothing recorded)"),
    }
}

fn render(snapshot: &TimerSnapshot) {
    print!(
        "\r{:<22} {} {}   ",
        status_label(snapshot),
        format_clock(snapshot.remaining_sec),
        progress_bar(snapshot.progress, 20)
    );
    let _ = io::stdout().flush();
}

pub fn status_label(snapshot: &TimerSnapshot) -> String {
    match snapshot.status {
        TimerStatus::Idle => "Ready".to_string(),
        TimerStatus::Paused => "Paused".to_string(),
        TimerStatus::Running => match (snapshot.mode, snapshot.phase) {
            (Some(SessionMode::FixedCycle), Some(Phase::Break)) => {
                let cycles = snapshot.cycles_per_set.unwrap_or(1);
                if snapshot.cycle_index % cycles == 0 {
                    "Long Break".to_string()
                } else {
                    "Short Break".to_string()
                }
            }
            (Some(SessionMode::FixedCycle), _) => format!(
                "Cycle {}/{} — Work",
                snapshot.cycle_index,
                snapshot.cycles_per_set.unwrap_or(1)
            ),
            _ => snapshot.tag.clone().unwrap_or_else(|| "Custom".to_string()),
        },
    }
}

fn print_summary(summary: &DaySummary) {
    println!("\n{} summary", summary.day);
    println!("  Focus time:  {}m", summary.total_minutes);
    println!("  Sessions:    {}", summary.session_count);
    println!("  Longest:     {}m", summary.longest_minutes);
    for session in &summary.sessions {
        println!("  {}", session_line(session));
    }
}

fn print_preferences(prefs: &Preferences) {
    let cycle = &prefs.fixed_cycle;
    println!("Default mode: {}", prefs.default_mode.as_str());
    println!(
        "Fixed-cycle:  work {}m, short break {}m, long break {}m, {} cycles",
        cycle.work_minutes, cycle.short_break_minutes, cycle.long_break_minutes, cycle.cycles
    );
    println!(
        "Freeform:     {}m{}",
        prefs.freeform.length_minutes,
        prefs
            .freeform
            .normalized_tag()
            .map(|tag| format!(" • {tag}"))
            .unwrap_or_default()
    );
    println!("Chime:        {}", if prefs.chime_enabled { "on" } else { "off" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn snapshot(status: TimerStatus) -> TimerSnapshot {
        TimerSnapshot {
            status,
            running: status == TimerStatus::Running,
            mode: Some(SessionMode::FixedCycle),
            phase: Some(Phase::Work),
            cycle_index: 2,
            cycles_per_set: Some(4),
            total_sec: 1500,
            remaining_sec: 1500,
            progress: 0.0,
            tag: None,
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_start_with_alias() {
        let cli = Cli::try_parse_from(["focus-friends", "start", "--mode", "pomodoro"]).unwrap();
        match cli.command {
            Commands::Start { mode, .. } => assert_eq!(mode, Some(ModeArg::FixedCycle)),
            _ => panic!("expected start"),
        }

        let cli =
            Cli::try_parse_from(["focus-friends", "start", "-m", "freeform", "--minutes", "45"])
                .unwrap();
        match cli.command {
            Commands::Start { mode, minutes, .. } => {
                assert_eq!(mode, Some(ModeArg::Freeform));
                assert_eq!(minutes, Some(45));
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_data_dir_flag_wins() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/focus"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/focus"));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(&snapshot(TimerStatus::Running)), "Cycle 2/4 — Work");
        assert_eq!(status_label(&snapshot(TimerStatus::Paused)), "Paused");

        let mut long_break = snapshot(TimerStatus::Running);
        long_break.phase = Some(Phase::Break);
        long_break.cycle_index = 4;
        assert_eq!(status_label(&long_break), "Long Break");
        long_break.cycle_index = 3;
        assert_eq!(status_label(&long_break), "Short Break");

        let mut freeform = snapshot(TimerStatus::Running);
        freeform.mode = Some(SessionMode::Freeform);
        freeform.phase = None;
        assert_eq!(status_label(&freeform), "Custom");
        freeform.tag = Some("essay".into());
        assert_eq!(status_label(&freeform), "essay");
    }
}
