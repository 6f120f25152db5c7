use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use aprshub::aprs::client::{AprsClient, AprsClientConfig};
use aprshub::dedup::{DEDUP_TTL, DedupCache};
use aprshub::ingest::IngestPipeline;
use aprshub::live_packets::LivePacketService;
use aprshub::packets_repo::PacketsRepository;
use aprshub::web::{self, AppState, PgPool, RateLimiter};

// Embed migrations at compile time
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

const API_RATE_LIMIT_PER_MINUTE: u32 = 120;

#[derive(Parser)]
#[command(name = "aprshub")]
#[command(about = "APRS-IS ingestion, storage, and live packet distribution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full service: APRS-IS ingestion, query API, and live hub
    Run {
        /// APRS-IS server hostname
        #[arg(long, env = "APRS_SERVER", default_value = "rotate.aprs2.net")]
        server: String,

        /// APRS-IS server port
        #[arg(long, env = "APRS_PORT", default_value = "14580")]
        port: u16,

        /// Callsign for the APRS-IS login
        #[arg(long, env = "APRS_CALLSIGN", default_value = "N0CALL")]
        callsign: String,

        /// APRS-IS passcode (-1 for a receive-only session)
        #[arg(long, env = "APRS_PASSCODE", default_value = "-1")]
        passcode: String,

        /// APRS-IS server-side filter expression
        #[arg(long, env = "APRS_FILTER", default_value = "r/52/21/500")]
        filter: String,

        /// Port for the HTTP API and websocket hub
        #[arg(long, env = "HTTP_PORT", default_value = "8080")]
        http_port: u16,

        /// Interface to bind the HTTP server to
        #[arg(long, env = "HTTP_INTERFACE", default_value = "0.0.0.0")]
        interface: String,
    },
}

fn setup_database_pool() -> Result<PgPool> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(10)
        .build(manager)
        .context("failed to create database connection pool")?;

    info!("Running database migrations...");
    let mut conn = pool
        .get()
        .context("failed to get a connection for migrations")?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    info!("Database ready");

    Ok(pool)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file early
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            server,
            port,
            callsign,
            passcode,
            filter,
            http_port,
            interface,
        } => {
            handle_run(
                server, port, callsign, passcode, filter, http_port, interface,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_run(
    server: String,
    port: u16,
    callsign: String,
    passcode: String,
    filter: String,
    http_port: u16,
    interface: String,
) -> Result<()> {
    aprshub::metrics::install_recorder();

    if callsign == "N0CALL" {
        warn!("Using default callsign N0CALL; set APRS_CALLSIGN to get a verified session");
    }
    info!("Starting aprshub against {}:{}", server, port);

    let pool = setup_database_pool()?;
    let live = LivePacketService::new();
    let dedup = DedupCache::new(DEDUP_TTL);
    let state = AppState {
        pool: pool.clone(),
        live: live.clone(),
        dedup: dedup.clone(),
        rate_limiter: RateLimiter::new(API_RATE_LIMIT_PER_MINUTE, Duration::from_secs(60)),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down...");
                cancel.cancel();
            }
        });
    }

    let client = AprsClient::new(AprsClientConfig {
        server,
        port,
        callsign,
        passcode,
        filter: Some(filter),
    });
    let pipeline = IngestPipeline::new(client, PacketsRepository::new(pool), dedup, live);

    let pipeline_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            pipeline.run(cancel).await;
        })
    };

    web::start_web_server(&interface, http_port, state, cancel.clone()).await?;

    // The web server exits on cancellation; wait for the pipeline to drain.
    cancel.cancel();
    let _ = pipeline_task.await;
    info!("Shutdown complete");
    Ok(())
}
