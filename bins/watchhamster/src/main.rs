use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

mod commands;

/// WatchHamster - watchdog for the news monitoring services
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Supervise the configured monitors until interrupted
    Run {
        /// Configuration file path (YAML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Monitoring mode (overrides config)
        #[arg(short, long)]
        mode: Option<String>,

        /// Monitors to run in individual mode
        #[arg(long, value_delimiter = ',')]
        monitors: Vec<String>,

        /// Run duration in seconds (for testing)
        #[arg(long)]
        run_duration: Option<u64>,
    },

    /// Print business-day information for a date
    BusinessDay {
        /// Date as YYYYMMDD or YYYY-MM-DD
        date: String,

        /// Take the holiday table from this configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Compare a day's news data against historical days
    Compare {
        /// Directory of <YYYYMMDD>.json news data files
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,

        #[arg(long)]
        date: String,

        /// Write the JSON report into this directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Days of history to search
        #[arg(long, default_value_t = watchhamster_business_day::DEFAULT_SEARCH_RANGE_DAYS)]
        range_days: u32,

        /// Holiday table and webhook for the summary
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Manage webhook-file backups
    Backup {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        #[command(subcommand)]
        action: BackupAction,
    },

    /// Send a test message to the test webhook
    NotifyTest {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        #[arg(long, default_value = "WatchHamster webhook test")]
        message: String,
    },
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    Create {
        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },
    List,
    Rollback {
        backup_id: String,
    },
    /// Roll back to the most recent backup, recording `context` as the cause
    AutoRollback {
        context: String,
    },
    Verify {
        backup_id: String,
    },
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            config,
            mode,
            monitors,
            run_duration,
        } => {
            let config = commands::load_config(&config)?;
            let level = if args.debug {
                "debug"
            } else {
                config.watchhamster.log_level.as_str()
            };
            initialize_logging(level)?;
            info!("Starting WatchHamster");
            commands::run(config, mode.as_deref(), monitors, run_duration).await
        }
        Command::BusinessDay { date, config } => {
            initialize_logging(default_level(args.debug))?;
            commands::business_day(&date, config.as_deref())
        }
        Command::Compare {
            data_dir,
            date,
            output,
            range_days,
            config,
        } => {
            initialize_logging(default_level(args.debug))?;
            commands::compare(&data_dir, &date, output.as_deref(), range_days, config.as_deref())
                .await
        }
        Command::Backup { config, action } => {
            initialize_logging(default_level(args.debug))?;
            commands::backup(&config, action)
        }
        Command::NotifyTest { config, message } => {
            initialize_logging(default_level(args.debug))?;
            commands::notify_test(&config, &message).await
        }
    }
}

fn default_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Log to stderr so command output on stdout stays parseable
fn initialize_logging(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Failed to install signal handlers ({}), using Ctrl+C", e);
                    let _ = signal::ctrl_c().await;
                    info!("Received Ctrl+C signal");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
