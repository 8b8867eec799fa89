mod commands;
mod config;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing::debug;

use crate::commands::{
    cmd_clear, cmd_delete, cmd_history, cmd_log, cmd_remind_interval, cmd_remind_test,
    cmd_remind_watch, cmd_summary, cmd_target_set, cmd_target_show,
};
use crate::config::Config;
use drip_core::db::SqliteStore;
use drip_core::ledger::LedgerService;
use drip_core::models::HISTORY_DAYS;
use drip_core::notify::TokioNotifier;
use drip_core::reminder::ReminderScheduler;
use drip_core::settings::Settings;
use drip_core::store::KeyValueStore;

#[derive(Parser)]
#[command(
    name = "drip",
    version,
    about = "A simple water intake tracker CLI",
    long_about = "\n\n  ██████╗ ██████╗ ██╗██████╗
  ██╔══██╗██╔══██╗██║██╔══██╗
  ██║  ██║██████╔╝██║██████╔╝
  ██║  ██║██╔══██╗██║██╔═══╝
  ██████╔╝██║  ██║██║██║
  ╚═════╝ ╚═╝  ╚═╝╚═╝╚═╝
      stay hydrated.
"
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a drink (prompts with presets when no amount is given)
    Log {
        /// Amount in ml (e.g. "250", "500ml")
        amount: Option<String>,
        /// Date to log for (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time of day (HH:MM, default: now)
        #[arg(long)]
        time: Option<String>,
        /// Optional note
        #[arg(short, long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry by ID (or a unique ID prefix)
    Delete {
        /// Entry ID
        entry_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily progress and entries (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value_t = HISTORY_DAYS)]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the daily water target
    Target {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Manage water reminders
    Remind {
        #[command(subcommand)]
        command: RemindCommands,
    },
    /// Delete every logged entry
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Show the daily target
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the daily target
    Set {
        /// Daily target in ml
        ml: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RemindCommands {
    /// Show or change the reminder interval
    Interval {
        /// Minutes between reminders
        minutes: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a reminder right away
    Test {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run reminders in the foreground until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let _guard = logging::enable_logging(&config.log_dir, cli.verbose)
        .context("Failed to initialize logging")?;
    debug!(data_dir = %config.data_dir.display(), "starting");

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&config.db_path)?);
    let settings = Settings::load(store.as_ref()).await?;
    let notifier = Arc::new(TokioNotifier::new(config.notifications));

    let ledger = LedgerService::new(store.clone(), &settings);
    let scheduler = ReminderScheduler::new(store, notifier.clone(), &settings);

    match cli.command {
        Commands::Log {
            amount,
            date,
            time,
            note,
            json,
        } => cmd_log(&ledger, amount, date, time, note, json).await,
        Commands::Delete { entry_id, json } => cmd_delete(&ledger, &entry_id, json).await,
        Commands::Summary { date, json } => cmd_summary(&ledger, date, json).await,
        Commands::History { days, json } => cmd_history(&ledger, days, json).await,
        Commands::Clear { yes, json } => cmd_clear(&ledger, yes, json).await,
        Commands::Target { command } => match command {
            TargetCommands::Show { json } => cmd_target_show(&ledger, json),
            TargetCommands::Set { ml, json } => cmd_target_set(&ledger, ml, json).await,
        },
        Commands::Remind { command } => match command {
            RemindCommands::Interval { minutes, json } => {
                cmd_remind_interval(&scheduler, minutes, json).await
            }
            RemindCommands::Test { json } => cmd_remind_test(&scheduler, &notifier, json).await,
            RemindCommands::Watch => cmd_remind_watch(&ledger, &scheduler, &notifier).await,
        },
    }
}
