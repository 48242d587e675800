use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vardex::{
    Config,
    handlers::{AppState, create_router},
    indexing::BulkIndexer,
    ingest::{DrsUploader, GeneIngestion, TabixCommand, VariantIngestion},
    query::QueryService,
    registry::Registry,
    storage::{DocumentStore, ElasticsearchStore, MemoryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Create document store
    let store: Arc<dyn DocumentStore> = match &config.es_url {
        Some(url) => {
            tracing::info!("Document store: {}", url);
            Arc::new(ElasticsearchStore::new(
                url,
                config.es_username.clone(),
                config.es_password.clone(),
            )?)
        }
        None => {
            tracing::warn!("No document store configured, keeping documents in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let indexer = BulkIndexer::spawn(store.clone(), config.bulk());

    let variants = VariantIngestion::new(
        config.variant_ingest(),
        Registry::spawn("variants"),
        indexer.clone(),
        Arc::new(DrsUploader::new(config.upload())?),
        Arc::new(TabixCommand::new(config.tabix.clone())),
    );
    let genes = GeneIngestion::new(
        config.gene_ingest(),
        Registry::spawn("genes"),
        indexer,
        store.clone(),
    )?;

    let state = AppState {
        variants,
        genes,
        queries: QueryService::new(store),
    };

    let app = create_router(state);
    let app = if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting vardex server on {}", addr);
    tracing::info!("VCF directory: {:?}", config.vcf_dir);
    tracing::info!("Bridge directory: {:?}", config.bridge_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
