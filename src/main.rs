use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wager_court::api::health::HealthState;
use wager_court::api::{router, ApiState};
use wager_court::config::{Config, CHANNEL_CAPACITY};
use wager_court::db::AuditWriter;
use wager_court::directory::InMemoryDirectory;
use wager_court::dispute::{DeskSettings, DisputeDesk};
use wager_court::error::Result;
use wager_court::events::EventSink;
use wager_court::latency::CoreLatency;
use wager_court::ledger::Ledger;
use wager_court::settlement::WagerBook;
use wager_court::sweeper::DisputeSweeper;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Channels ---
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let events = EventSink::new(event_tx);

    // --- Core ---
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(CoreLatency::default());
    // Membership and platform identities are supplied by the external messaging layer.
    let directory = InMemoryDirectory::new();
    let ledger = Ledger::new(events.clone());
    let wagers = WagerBook::new(Arc::clone(&ledger), events.clone(), Arc::clone(&latency));
    let desk = DisputeDesk::new(
        wagers.clone(),
        Arc::clone(&ledger),
        directory.clone(),
        directory.clone(),
        events,
        Arc::clone(&latency),
        DeskSettings {
            expiry: chrono::Duration::hours(cfg.dispute_expiry_hours),
        },
    );
    info!(
        expiry_hours = cfg.dispute_expiry_hours,
        sweep_secs = cfg.expiry_sweep_interval_secs,
        "Wager core ready",
    );

    // --- Spawn tasks ---

    // Audit writer
    let writer = AuditWriter::new(pool.clone(), event_rx, Arc::clone(&health));
    tokio::spawn(async move { writer.run().await });

    // Dispute expiry sweeper
    let sweeper = DisputeSweeper::new(
        Arc::clone(&desk),
        Duration::from_secs(cfg.expiry_sweep_interval_secs),
    );
    tokio::spawn(async move { sweeper.run().await });

    // HTTP API server
    let api_state = ApiState {
        pool: pool.clone(),
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
