//! PetalSync - Reminder scheduling and offline sync core
//!
//! Main entry point for the PetalSync demo daemon.

use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use petalsync::config::CoreConfig;
use petalsync::intake::{IntakeApiClient, IntakeLogger, NullIntakeLogger};
use petalsync::notify::LogNotifier;
use petalsync::reminder::{ReminderKind, ReminderScheduler, ReminderSpec, ReminderStyle};
use petalsync::sync::store::PendingStore;
use petalsync::sync::transport::StubChannel;
use petalsync::sync::SyncEngine;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// PetalSync - reminder scheduling and offline multi-device sync core
#[derive(Parser, Debug)]
#[command(name = "petalsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/petalsync/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Run the scheduler and sync engine against the stub transport
    Run {
        /// User to open the sync session for
        #[arg(short, long, default_value = "demo-user")]
        user: String,

        /// Schedule a demo pill reminder at this time of day (HH:MM)
        #[arg(long)]
        remind_at: Option<String>,
    },

    /// Print current metrics in Prometheus text format
    Metrics,
}

#[tokio::main]
async fn main() {
    if let Err(e) = petalsync::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(CoreConfig::default_path);

    if let Err(e) = run(cli, config_path).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli, config_path: PathBuf) -> petalsync::Result<()> {
    match cli.command {
        Commands::Init => {
            let config = CoreConfig::new();
            config.save(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
        Commands::Run { user, remind_at } => {
            let config = if config_path.exists() {
                CoreConfig::load(&config_path)?
            } else {
                CoreConfig::new()
            };

            let intake: Arc<dyn IntakeLogger> = match &config.intake_api {
                Some(base) => Arc::new(IntakeApiClient::new(base.clone())),
                None => Arc::new(NullIntakeLogger),
            };

            let scheduler = ReminderScheduler::new(
                config.scheduler.clone(),
                Arc::new(LogNotifier),
                intake,
            );

            if let Some(time) = remind_at {
                let time_of_day: NaiveTime = time
                    .parse()
                    .map_err(|e| petalsync::PetalSyncError::Config(format!("Bad time: {}", e)))?;
                let id = scheduler
                    .schedule(ReminderSpec {
                        user_id: user.clone(),
                        kind: ReminderKind::Pill,
                        time_of_day,
                        style: ReminderStyle::default(),
                        recurring: true,
                    })
                    .await?;
                println!("Scheduled reminder {}", id);
            }

            let engine = SyncEngine::new(
                config.sync.clone(),
                config.device_id.clone(),
                user.clone(),
                Arc::new(StubChannel::new()),
                PendingStore::open(&config.db_path)?,
            );
            engine.connect(&user).await?;

            let mut status_rx = engine.watch_status();
            let status_task = tokio::spawn(async move {
                while status_rx.changed().await.is_ok() {
                    let status = status_rx.borrow().clone();
                    tracing::info!(
                        connected = status.is_connected,
                        pending = status.pending_change_count,
                        in_progress = status.sync_in_progress,
                        "Sync status"
                    );
                }
            });

            println!("Running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;

            status_task.abort();
            engine.disconnect().await;
            println!("Stopped");
            Ok(())
        }
        Commands::Metrics => {
            print!("{}", petalsync::metrics::gather());
            Ok(())
        }
    }
}
