//! pathgate - Learning path progression and gating
//!
//! CLI entry point over the JSON data document.

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pathgate::cli::{
    AttemptAction, AttemptCommand, AttemptOptions, NextCommand, NextOptions, ProgressCommand,
    ProgressOptions, SkillsCommand, SkillsOptions, StepsCommand, StepsOptions,
};
use pathgate::config::{pathgate_home, Config};
use pathgate::core::{ModuleId, NavigationMode, SkillId, StepId, TrainingId, UserId};
use pathgate::error::exit_codes;
use pathgate::events::JsonlEventLog;
use pathgate::pathway::Pathway;
use pathgate::storage::{FileStore, Store};

// =============================================================================
// CLI Definition
// =============================================================================

/// pathgate - Learning path progression and gating
#[derive(Parser)]
#[command(name = "pathgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the resolved steps of a training
    Steps {
        training: TrainingId,
        /// Learner id
        #[arg(long, short)]
        user: UserId,
        /// Navigation mode (defaults to the training's)
        #[arg(long, short, value_enum)]
        mode: Option<Mode>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show the step a learner lands on when entering a training
    First {
        training: TrainingId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },

    /// Advance past a step (exit 2 when blocked, 3 on structural drift)
    Next {
        training: TrainingId,
        /// Step the learner is leaving
        step: StepId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },

    /// Start an attempt, or show the open one
    Start {
        training: TrainingId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },

    /// Finalize a completed attempt and start over
    Restart {
        training: TrainingId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },

    /// Drop a completion recorded against an older training structure
    Discard {
        training: TrainingId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show training progress and score
    Progress {
        training: TrainingId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show the score of one module
    Score {
        module: ModuleId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },

    /// Recompute a skill stage and check its tree
    Skills {
        skill: SkillId,
        #[arg(long, short)]
        user: UserId,
        #[arg(long, short)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Guided,
    Free,
}

impl From<Mode> for NavigationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Guided => NavigationMode::Guided,
            Mode::Free => NavigationMode::Free,
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    setup_tracing();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pathgate error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_env("PATHGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("pathgate panic: {}", info);

        if let Some(home) = pathgate_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::ERROR);
    }));
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let pathway = open_pathway()?;

    match cli.command {
        Commands::Steps {
            training,
            user,
            mode,
            json,
            quiet,
        } => {
            let options = StepsOptions {
                json,
                quiet,
                mode: mode.map(Into::into),
                first: false,
            };
            run_steps(&pathway, training, user, &options)
        }
        Commands::First {
            training,
            user,
            json,
            quiet,
        } => {
            let options = StepsOptions {
                json,
                quiet,
                mode: None,
                first: true,
            };
            run_steps(&pathway, training, user, &options)
        }
        Commands::Next {
            training,
            step,
            user,
            json,
            quiet,
        } => {
            let cmd = NextCommand::new(&pathway);
            let output = cmd.run(training, step, user);
            print_output(&cmd.format_output(&output, &NextOptions { json, quiet }));
            Ok(ExitCode::from(output.exit_code() as u8))
        }
        Commands::Start {
            training,
            user,
            json,
            quiet,
        } => run_attempt(&pathway, training, user, AttemptAction::Start, json, quiet),
        Commands::Restart {
            training,
            user,
            json,
            quiet,
        } => run_attempt(&pathway, training, user, AttemptAction::Restart, json, quiet),
        Commands::Discard {
            training,
            user,
            json,
            quiet,
        } => run_attempt(&pathway, training, user, AttemptAction::Discard, json, quiet),
        Commands::Progress {
            training,
            user,
            json,
            quiet,
        } => {
            let options = ProgressOptions {
                json,
                quiet,
                module: None,
            };
            run_progress(&pathway, training, user, &options)
        }
        Commands::Score {
            module,
            user,
            json,
            quiet,
        } => {
            let options = ProgressOptions {
                json,
                quiet,
                module: Some(module),
            };
            run_progress(&pathway, 0, user, &options)
        }
        Commands::Skills {
            skill,
            user,
            json,
            quiet,
        } => {
            let cmd = SkillsCommand::new(&pathway);
            let output = cmd.run(user, skill);
            print_output(&cmd.format_output(&output, &SkillsOptions { json, quiet }));
            Ok(success_to_exit_code(output.success))
        }
    }
}

/// Build the pathway from configuration: file store, roster membership and
/// the JSONL event log when enabled.
fn open_pathway() -> Result<Pathway<FileStore>, Box<dyn std::error::Error>> {
    let config = Config::load();
    let store = match config.storage.data_path() {
        Some(path) => FileStore::with_path(path)?,
        None => FileStore::new()?,
    };
    let roster = store.roster()?;
    tracing::debug!(path = %store.path().display(), "opened data document");

    let events_log = config
        .events
        .enabled
        .then(|| config.events.log_path())
        .flatten();
    let mut pathway = Pathway::new(store, config).with_membership(roster);
    if let Some(path) = events_log {
        pathway = pathway.with_events(JsonlEventLog::new(path));
    }
    Ok(pathway)
}

// =============================================================================
// Command Implementations
// =============================================================================

fn print_output(text: &str) {
    if !text.is_empty() {
        print!("{}", text);
        if !text.ends_with('\n') {
            println!();
        }
    }
}

fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::OK as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

fn run_steps(
    pathway: &Pathway<FileStore>,
    training: TrainingId,
    user: UserId,
    options: &StepsOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = StepsCommand::new(pathway);
    let output = cmd.run(training, user, options);
    print_output(&cmd.format_output(&output, options));
    Ok(success_to_exit_code(output.success))
}

fn run_attempt(
    pathway: &Pathway<FileStore>,
    training: TrainingId,
    user: UserId,
    action: AttemptAction,
    json: bool,
    quiet: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let options = AttemptOptions {
        json,
        quiet,
        action,
    };
    let cmd = AttemptCommand::new(pathway);
    let output = cmd.run(training, user, &options);
    print_output(&cmd.format_output(&output, &options));
    Ok(success_to_exit_code(output.success))
}

fn run_progress(
    pathway: &Pathway<FileStore>,
    training: TrainingId,
    user: UserId,
    options: &ProgressOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cmd = ProgressCommand::new(pathway);
    let output = cmd.run(training, user, options);
    print_output(&cmd.format_output(&output, options));
    Ok(success_to_exit_code(output.success))
}
