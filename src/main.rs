//! Tunnel Notifier - watch logs for tunnel URLs and announce them.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tunnel_notifier::config::{write_default_config, Config, ConfigError, ConfigLoader, LOCAL_CONFIG_FILE};
use tunnel_notifier::dedup::{SeenSet, SeenUrls};
use tunnel_notifier::display;
use tunnel_notifier::extract::UrlExtractor;
use tunnel_notifier::http::build_http_client;
use tunnel_notifier::notifier::{NotificationPayload, Notifier};
use tunnel_notifier::pipeline::Pipeline;
use tunnel_notifier::watcher::WatchCoordinator;

/// Exit status for configuration problems.
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(
    name = "tunnel-notifier",
    about = "Watch log files for tunnel URLs and announce them to webhooks",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch log files and send notifications (default).
    Watch {
        /// Skip reading existing files at startup.
        #[arg(long)]
        no_scan: bool,
    },
    /// Send a sample notification to every configured webhook.
    TestWebhook,
    /// Print the tunnel URLs found in a file.
    Extract {
        /// Log file to scan.
        file: PathBuf,
    },
    /// Write the default configuration file.
    Init {
        /// Destination (defaults to ./.tunnel-notifier.toml).
        path: Option<PathBuf>,
    },
}

fn init_tracing(verbosity: u8, log_file: Option<&Path>) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false)),
            Err(e) => {
                eprintln!("Cannot open log file {}: {e}", path.display());
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Watch { no_scan: false }) {
        Commands::Init { path } => {
            init_tracing(cli.verbose, None);
            init(&path.unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE)))
        }
        Commands::Extract { file } => {
            init_tracing(cli.verbose, None);
            extract(&file)
        }
        command => {
            let config = load_config(cli.config);
            let log_file = config.as_ref().ok().and_then(|c| c.logging.file.as_deref());
            init_tracing(cli.verbose, log_file);

            let config = match config.and_then(|c| c.validate_for_delivery().map(|()| c)) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "Invalid configuration");
                    return ExitCode::from(EXIT_CONFIG);
                }
            };

            match command {
                Commands::TestWebhook => test_webhook(&config).await,
                Commands::Watch { no_scan } => watch(config, no_scan).await,
                Commands::Init { .. } | Commands::Extract { .. } => ExitCode::SUCCESS,
            }
        }
    }
}

fn init(path: &Path) -> ExitCode {
    match write_default_config(path) {
        Ok(()) => {
            display::print_config_written(path);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to write configuration");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn extract(path: &Path) -> ExitCode {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read file");
            return ExitCode::FAILURE;
        }
    };
    let text = String::from_utf8_lossy(&bytes);

    let extractor = UrlExtractor::new();
    let seen = SeenSet::new();
    let candidates: Vec<_> = extractor
        .extract(&text, path)
        .filter(|c| seen.check_and_mark(&c.url))
        .collect();

    display::print_extract_results(path, &candidates);
    ExitCode::SUCCESS
}

async fn test_webhook(config: &Config) -> ExitCode {
    let client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let notifier = Notifier::from_config(config, client);
    tracing::info!(endpoints = notifier.endpoints().len(), "Sending test notification");
    let reports = notifier.notify(&NotificationPayload::sample()).await;
    display::print_delivery_reports(&reports);

    if reports.iter().all(|r| r.outcome.is_delivered()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn watch(config: Config, no_scan: bool) -> ExitCode {
    let client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let pipeline = Pipeline::from_config(&config, &client, &shutdown);

    let mut watch_config = config.watch.clone();
    if no_scan {
        watch_config.startup_scan = false;
    }
    let coordinator = match WatchCoordinator::from_config(&watch_config, pipeline) {
        Ok(coordinator) => coordinator.with_shutdown(shutdown.clone()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start watcher");
            return if e.is_config() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            };
        }
    };

    display::print_watch_start(
        coordinator.matcher().targets(),
        config.webhooks.len(),
        config.shorteners.len(),
    );

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            signal_token.cancel();
        }
    });

    let result = coordinator.run().await;
    let stats = coordinator.pipeline().stats();
    tracing::info!(
        blocks = stats.blocks,
        candidates = stats.candidates,
        duplicates = stats.duplicates,
        notified = stats.notified,
        failed = stats.failed,
        "Watcher stopped"
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Watcher failed");
            ExitCode::FAILURE
        }
    }
}
