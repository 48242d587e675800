mod genes;
mod service_info;
mod variants;

pub use service_info::service_info;

use crate::ingest::{GeneIngestion, VariantIngestion};
use crate::query::QueryService;
use axum::{
    Router,
    routing::{delete, get},
};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub variants: VariantIngestion,
    pub genes: GeneIngestion,
    pub queries: QueryService,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Variant ingestion
        .route("/variants/ingestion/run", get(variants::run_ingestion))
        .route("/variants/ingestion/requests", get(variants::list_requests))
        .route("/variants/ingestion/requests/:id", get(variants::get_request))
        .route("/variants/ingestion/stats", get(variants::ingestion_stats))
        // Variant queries
        .route("/variants/get/by/variantId", get(variants::get_by_variant_id))
        .route("/variants/get/by/sampleId", get(variants::get_by_sample_id))
        .route("/variants/count/by/variantId", get(variants::count_by_variant_id))
        .route("/variants/count/by/sampleId", get(variants::count_by_sample_id))
        .route("/variants/overview", get(variants::overview))
        .route("/variants/datasets/:dataset", delete(variants::delete_dataset))
        // Genes
        .route("/genes/ingestion/run", get(genes::run_ingestion))
        .route("/genes/ingestion/requests", get(genes::list_requests))
        .route("/genes/ingestion/stats", get(genes::ingestion_stats))
        .route("/genes/search", get(genes::search))
        // Service info
        .route("/", get(service_info))
        .route("/service-info", get(service_info))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Comma separated values, trimmed, empties dropped.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
