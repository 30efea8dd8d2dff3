//! Gravity application entry point.
//!
//! Startup order:
//! 1. Parse CLI arguments and load the configuration file.
//! 2. Install the tracing subscriber and validate the configuration.
//! 3. Create the vector collection and the indexing pipeline.
//! 4. Register the live-source connectors.
//! 5. Index the optional seed directory.
//! 6. Build the session manager and serve the HTTP API.

mod cli;
mod seed;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use gravity_api::{start_server, AppState};
use gravity_chat::SessionManager;
use gravity_connector::{ChatConnector, ConnectorRegistry, SourceControlConnector, TrackerConnector};
use gravity_core::logging::init_tracing;
use gravity_core::{Clock, GravityConfig, SystemClock, UuidIds};
use gravity_ingest::{ChunkConfig, IndexingPipeline};
use gravity_vector::{DistanceMetric, EmbeddingService, MemoryVectorStore, MockEmbedding, VectorStore};

use crate::cli::CliArgs;

const CONNECTOR_RETRY_DELAY: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let mut config = GravityConfig::load_or_default(&config_file);
    config.general.port = args.resolve_port(config.general.port);
    config.general.log_level = args.resolve_log_level(&config.general.log_level);

    init_tracing(&config.general.log_level);
    tracing::info!("Starting Gravity v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let metric: DistanceMetric = config.vector.metric.parse()?;
    let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    store
        .create_collection(&config.vector.collection, config.vector.dimension, metric)
        .await?;
    tracing::info!(
        collection = %config.vector.collection,
        dimension = config.vector.dimension,
        metric = %metric,
        "Vector collection ready"
    );

    let embedder: Arc<dyn EmbeddingService> =
        Arc::new(MockEmbedding::with_dimensions(config.vector.dimension));
    let pipeline = IndexingPipeline::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        config.vector.collection.clone(),
        ChunkConfig::from(&config.chunking),
    )?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut registry = ConnectorRegistry::with_retry_delay(CONNECTOR_RETRY_DELAY);
    registry.register(Arc::new(TrackerConnector::with_demo_data(Arc::clone(&clock))));
    registry.register(Arc::new(ChatConnector::with_demo_data(Arc::clone(&clock))));
    registry.register(Arc::new(SourceControlConnector::with_demo_data(Arc::clone(&clock))));
    let registry = Arc::new(registry);
    tracing::info!(connectors = ?registry.names(), "Connectors registered");

    if let Some(dir) = args.seed_dir.as_deref() {
        if let Err(e) = seed::index_seed_dir(&pipeline, dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "Seed directory not indexed");
        }
    }

    let sessions = SessionManager::from_config(
        &config,
        Arc::clone(&store),
        embedder,
        Arc::clone(&registry),
        clock,
        Arc::new(UuidIds),
    );

    let state = AppState::new(config.clone(), sessions, store, registry);
    start_server(&config, state).await?;

    Ok(())
}
