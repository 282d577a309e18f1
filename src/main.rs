use callsheet::collab::{AllPresent, LogNotifier};
use callsheet::config::{ConfigFile, ServiceConfig, TransportKind};
use callsheet::eviction::{EvictionCycle, EvictionScheduler};
use callsheet::observability::init_tracing;
use callsheet::roster::{tables, Roster};
use callsheet::sheets::{InMemorySheets, SheetTransport};
use callsheet::store::TableStore;
use callsheet::worker::spawn_serial_worker;
use std::path::Path;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // An optional TOML file replaces the environment.
    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::load(Path::new(&path))?,
        None => ServiceConfig::from_env()?,
    };
    init_tracing(config.log_json);

    match config.transport {
        TransportKind::Memory => {
            let sheets = InMemorySheets::new()
                .with_table(tables::REQUESTS, &["id", "name", "added"])
                .with_table(tables::NEW_CALLERS, &["id", "name", "european", "added"])
                .with_table(tables::REPEAT_CALLERS, &["id", "name", "european", "added"])
                .with_table(tables::CALLER_HISTORY, &["id", "name", "added"])
                .with_table(tables::DENIED_REQUESTS, &["id", "name", "reason", "added"]);
            serve(config, sheets).await
        }
        TransportKind::Http => serve_http(config).await,
    }
}

#[cfg(feature = "sheets-http")]
async fn serve_http(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let token = config.sheets_token.clone().unwrap_or_default();
    let sheets = callsheet::sheets::HttpSheets::new(
        config.sheets_url.clone(),
        config.spreadsheet_id.clone(),
        token,
    );
    serve(config, sheets).await
}

#[cfg(not(feature = "sheets-http"))]
async fn serve_http(_config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    Err(Box::new(callsheet::config::ConfigError::Invalid(
        "http transport requires building with --features sheets-http".to_string(),
    )))
}

async fn serve<T: SheetTransport>(
    config: ServiceConfig,
    transport: T,
) -> Result<(), Box<dyn std::error::Error>> {
    let document = ConfigFile::open(&config.config_path)?;
    let (worker, worker_task) = spawn_serial_worker();
    let store = TableStore::new(transport, worker.clone());

    let roster = Roster::new(store.clone()).with_confirmation_timeout(config.confirmation_timeout);
    for table in tables::ACTIVE {
        match roster.list(table).await {
            Ok(records) => info!(table, listed = records.len(), "list loaded"),
            Err(e) => warn!(table, error = %e, "unable to read list"),
        }
    }

    let cycle = EvictionCycle::new(store, document, config.eviction_table.clone())
        .with_directory(AllPresent)
        .with_notifier(LogNotifier)
        .with_summary(LogNotifier);
    let scheduler = EvictionScheduler::with_interval(cycle, config.eviction_interval);
    scheduler.start();

    info!(
        table = %config.eviction_table,
        transport = ?config.transport,
        confirmation_timeout = ?config.confirmation_timeout,
        "callsheet running, ctrl-c to stop"
    );
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    scheduler.stop().await;
    worker.shutdown().await;
    worker_task.await?;
    Ok(())
}
