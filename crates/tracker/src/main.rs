//! Rally tracker - live leaderboards for the invite competition.
//!
//! This binary provides:
//! - Historical backfill of players, trust events and invite redemptions
//! - Live polling that keeps rankings current until the window closes
//! - A one-shot standings printout
//! - Profile cache initialization

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use rally_core::ScoreEntry;
use rally_tracker::client::IndexerClient;
use rally_tracker::profiles::{ProfileResolver, ProfileStore};
use rally_tracker::{Config, Tracker};

#[derive(Parser)]
#[command(name = "rally-tracker")]
#[command(version, about = "Live leaderboard tracker for the rally competition", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "rally.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracker (backfill, then live updates until Ctrl+C)
    Run,

    /// One-shot backfill, print the current standings and exit
    Standings,

    /// Initialize the profile cache database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://profiles.db")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_tracker(&cli.config).await?,
        Commands::Standings => show_standings(&cli.config).await?,
        Commands::InitDb { database_url } => init_database(&database_url).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging.
fn init_logging(debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("rally_tracker=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("rally_tracker=info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .init();

    Ok(())
}

async fn build_tracker(config_path: &str) -> Result<(Tracker, ProfileStoreGuard)> {
    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    info!("Configuration loaded");
    info!(
        "  Window: {} .. {}",
        format_timestamp(config.competition.window_start),
        format_timestamp(config.competition.window_end)
    );
    info!("  Collection: {}", config.competition.collection_address);
    info!("  Indexer: {}", config.indexer.rpc_url);
    info!("  Profile cache: {}", config.profiles.database_url);

    let store = ProfileStore::new(&config.profiles.database_url)
        .await
        .context("Failed to open profile cache")?;
    store
        .run_migrations()
        .await
        .context("Failed to run profile cache migrations")?;

    let client = Arc::new(IndexerClient::new(
        &config.indexer.rpc_url,
        config.indexer.page_size,
    ));
    let resolver = Arc::new(ProfileResolver::new(
        store.clone(),
        client.clone(),
        &config.profiles.batch_url,
    ));

    let tracker = Tracker::new(config, client, resolver)?;
    Ok((tracker, ProfileStoreGuard { store }))
}

/// Keeps the cache pool alive for the lifetime of a command and closes it
/// on the way out.
struct ProfileStoreGuard {
    store: ProfileStore,
}

impl ProfileStoreGuard {
    async fn close(&self) {
        self.store.close().await;
    }
}

/// Main service: backfill, then live polling until shutdown.
async fn run_tracker(config_path: &str) -> Result<()> {
    info!("Rally tracker starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let (tracker, guard) = build_tracker(config_path).await?;

    tracker.bootstrap().await?;

    let state = tracker.state();
    info!("Backfill complete: {} players", state.players().len());
    log_board("Top inviters", &state.top_inviters());
    log_board("Top trusters", &state.top_trusters());

    let live = tracker.spawn_live();
    info!("Live polling started. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received shutdown signal, stopping subscriptions");

    live.shutdown();
    guard.close().await;

    Ok(())
}

/// One-shot backfill and standings printout.
async fn show_standings(config_path: &str) -> Result<()> {
    let (tracker, guard) = build_tracker(config_path).await?;

    tracker.bootstrap().await?;
    let state = tracker.state();

    println!("\n=== Rally Standings ===\n");
    println!("Players registered: {}", state.players().len());

    for (title, board, status) in [
        ("Top inviters", state.top_inviters(), state.invites_status()),
        ("Top trusters", state.top_trusters(), state.trust_status()),
    ] {
        println!("\n{}:", title);
        if let Some(error) = status.error {
            println!("  (data unavailable: {})", error);
            continue;
        }
        if board.is_empty() {
            println!("  (no scores yet)");
            continue;
        }
        for (position, entry) in board.iter().enumerate() {
            println!("  {:>2}. {}  {}", position + 1, display_name(entry), entry.score);
        }
    }
    println!();

    guard.close().await;

    Ok(())
}

/// Initialize the profile cache database.
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing profile cache: {}", database_url);

    let store = ProfileStore::new(database_url)
        .await
        .context("Failed to open profile cache")?;
    store
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let count = store.count().await?;
    info!("Profile cache ready ({} cached profiles)", count);

    store.close().await;

    Ok(())
}

fn log_board(title: &str, board: &[ScoreEntry]) {
    if board.is_empty() {
        info!("{}: no scores yet", title);
        return;
    }
    for (position, entry) in board.iter().enumerate() {
        info!("{} #{}: {} ({})", title, position + 1, display_name(entry), entry.score);
    }
}

fn display_name(entry: &ScoreEntry) -> String {
    entry
        .name
        .clone()
        .unwrap_or_else(|| entry.address.to_string())
}

fn format_timestamp(unix_seconds: u64) -> String {
    chrono::DateTime::from_timestamp(unix_seconds as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| unix_seconds.to_string())
}
