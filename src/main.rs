use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geostudy::{
    api,
    catalog::ImageCatalog,
    collector::{HttpCollector, MemoizedCollector, ResponseCollector},
    config::{Settings, StoreBackend},
    error::StudyResult,
    state::AppState,
    store::{CouchStore, DocumentStore, MemoryStore},
};

/// Distinct collector records kept in memory
const COLLECTOR_CACHE_ENTRIES: u64 = 128;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geostudy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Study backend stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> StudyResult<()> {
    let settings = Settings::from_env()?;
    tracing::info!(service = %settings.service_name, "Starting study backend...");

    let store: Arc<dyn DocumentStore> = match settings.store_backend {
        StoreBackend::CouchDb => Arc::new(CouchStore::new(&settings.couch_config()?)?),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, records are lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!(backend = store.name(), "Document store ready");

    let http_collector: Arc<dyn ResponseCollector> = Arc::new(HttpCollector::new(
        settings.collector_url.clone(),
        settings.collector_timeout,
    )?);
    let collector = Arc::new(MemoizedCollector::new(
        http_collector,
        COLLECTOR_CACHE_ENTRIES,
    ));

    let catalog = ImageCatalog::load(&settings.study_data, settings.study.control_round)?;
    tracing::info!(
        images = catalog.image_count(),
        max_round = catalog.max_round(),
        "Loaded study catalog from {}",
        settings.study_data.display()
    );

    let state = Arc::new(AppState::new(
        store,
        Arc::new(catalog),
        collector,
        settings.study.clone(),
    ));
    let app = api::app(state, &settings)?;

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("Listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
