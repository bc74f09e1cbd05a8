//! # Stride CLI
//!
//! Notification engine for habit and goal tracking: in-app queue,
//! recurring reminders, periodic backups and external delivery.
//!
//! Usage:
//!   stride run                              # Run reminders and backups until Ctrl-C
//!   stride notify "Goal reached" -m "10k"   # One-shot send through channels
//!   stride quiet                            # Are we inside quiet hours?
//!   stride config show                      # Show configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use stride_core::StrideConfig;
use stride_core::config::expand_path;
use stride_core::traits::{ConfigFileSettings, DeliverySettings, SettingsSource, StaticSettings};
use stride_core::types::{NotificationKind, Priority};
use stride_scheduler::{DispatchOutcome, NotifyEngine, StateStore};

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "🔔 Stride — notifications, reminders and backups for habit tracking"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: reminders, backups and the in-app queue
    Run {
        /// State file path (defaults to ~/.stride/state.json)
        #[arg(long)]
        state: Option<String>,
    },

    /// Send one notification through external channels
    Notify {
        /// Title
        title: String,

        /// Message body
        #[arg(short, long, default_value = "")]
        message: String,

        /// goal, habit, achievement, reminder, backup, system or any custom name
        #[arg(short, long, default_value = "system")]
        kind: String,

        /// low, medium, high or urgent
        #[arg(short, long)]
        priority: Option<String>,

        /// Channel to deliver to (repeatable; defaults to every configured channel)
        #[arg(long = "channel")]
        channels: Vec<String>,
    },

    /// Show whether the current local time is inside quiet hours
    Quiet,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

fn parse_kind(raw: &str) -> NotificationKind {
    match raw.trim().to_ascii_lowercase().as_str() {
        "goal" => NotificationKind::Goal,
        "habit" => NotificationKind::Habit,
        "achievement" => NotificationKind::Achievement,
        "reminder" => NotificationKind::Reminder,
        "backup" => NotificationKind::Backup,
        "system" => NotificationKind::System,
        other => NotificationKind::Custom(other.to_string()),
    }
}

fn build_engine(config: &StrideConfig, config_path: &std::path::Path) -> NotifyEngine {
    let settings: Arc<dyn SettingsSource> = if config_path.exists() {
        Arc::new(ConfigFileSettings::new(config_path.to_path_buf(), config))
    } else {
        Arc::new(StaticSettings::new(DeliverySettings::from_config(config)))
    };
    NotifyEngine::builder(config.queue.clone())
        .settings(settings)
        .channels(stride_channels::build_channels(&config.channels))
        .dispatch_timeout(std::time::Duration::from_secs(30))
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "stride=debug,stride_core=debug,stride_scheduler=debug,stride_channels=debug"
    } else {
        "stride=info,stride_scheduler=info,stride_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Load config
    let config_path: PathBuf = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(StrideConfig::default_path);
    let init = matches!(cli.command, Commands::Config { action: ConfigAction::Init });
    let config = if cli.config.is_none() {
        StrideConfig::load()?
    } else if config_path.exists() || !init {
        StrideConfig::load_from(&config_path)?
    } else {
        StrideConfig::default()
    };

    match cli.command {
        Commands::Run { state } => {
            let engine = build_engine(&config, &config_path);
            let state_path = state.as_deref().map(expand_path).unwrap_or_else(StateStore::default_path);
            let store = Arc::new(
                StateStore::open(&state_path)
                    .with_context(|| format!("opening state file {}", state_path.display()))?,
            );

            println!("🔔 Stride v{} — owner '{}'", env!("CARGO_PKG_VERSION"), config.owner);
            println!("   Channels: {}", engine.channel_ids().join(", "));
            println!("   State: {}", state_path.display());

            stride_scheduler::reminders::register_reminders(
                &engine,
                &store,
                &config.owner,
                &config.reminders,
                &chrono::Local,
            );
            if config.backup.enabled {
                match stride_scheduler::backup::BackupPlan::from_config(&config.backup) {
                    Ok(plan) => {
                        stride_scheduler::backup::schedule_backups(&engine, &store, &config.owner, plan)?;
                    }
                    Err(e) => tracing::warn!("⚠️ Backups disabled: {e}"),
                }
            }

            // The terminal stands in for the UI: print the on-screen set on change.
            let mut view = engine.subscribe();
            let watcher = tokio::spawn(async move {
                while view.changed().await.is_ok() {
                    let active = view.borrow_and_update().clone();
                    if active.is_empty() {
                        continue;
                    }
                    println!("── on screen ──");
                    for n in &active {
                        println!("  [{}] {} — {}", n.priority, n.title, n.message);
                    }
                }
            });

            tokio::signal::ctrl_c().await?;
            let cancelled = engine.shutdown_owner(&config.owner);
            engine.clear();
            watcher.abort();
            println!("\n👋 Stopped {cancelled} schedule(s).");
        }

        Commands::Notify { title, message, kind, priority, channels } => {
            let engine = build_engine(&config, &config_path);
            let mut notification = engine.build(parse_kind(&kind), title, message);
            if let Some(p) = priority {
                notification = notification.with_priority(p.parse::<Priority>()?);
            }
            let targets = if channels.is_empty() { engine.channel_ids() } else { channels };
            notification = notification.with_channels(targets);

            match engine.dispatch_now(&notification).await {
                DispatchOutcome::Sent(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    if !result.all_succeeded() {
                        anyhow::bail!("delivery failed on: {}", result.failed().collect::<Vec<_>>().join(", "));
                    }
                }
                DispatchOutcome::QuietHours => {
                    println!("🌙 Quiet hours ({} – {}), nothing sent.",
                        config.quiet_hours.start.format("%H:%M"),
                        config.quiet_hours.end.format("%H:%M"));
                }
            }
        }

        Commands::Quiet => {
            let now = chrono::Local::now().time();
            let qh = config.quiet_hours;
            if !qh.enabled {
                println!("Quiet hours are disabled.");
            } else if qh.is_quiet(now) {
                println!("🌙 Quiet ({} – {}), now {}", qh.start.format("%H:%M"), qh.end.format("%H:%M"), now.format("%H:%M"));
            } else {
                println!("🔔 Not quiet ({} – {}), now {}", qh.start.format("%H:%M"), qh.end.format("%H:%M"), now.format("%H:%M"));
            }
        }

        Commands::Config { action } => {
            match action {
                ConfigAction::Show => {
                    let content = toml::to_string_pretty(&config)?;
                    println!("{content}");
                }
                ConfigAction::Path => {
                    println!("{}", config_path.display());
                }
                ConfigAction::Init => {
                    if config_path.exists() {
                        println!("Config already exists at {}", config_path.display());
                    } else {
                        StrideConfig::default().save_to(&config_path)?;
                        println!("✅ Wrote default configuration to {}", config_path.display());
                    }
                }
            }
        }
    }

    Ok(())
}
