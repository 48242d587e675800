use super::AppState;
use crate::Result;
use crate::indexing::BulkStats;
use crate::query::{GeneQuery, GeneResults, genes::DEFAULT_SIZE};
use crate::types::{AssemblyId, IngestResponse, IngestionRequest};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneParams {
    #[serde(default)]
    pub term: String,
    pub chromosome: Option<String>,
    pub assembly_id: Option<String>,
    pub size: Option<usize>,
}

pub async fn run_ingestion(State(state): State<AppState>) -> Result<Json<Vec<IngestResponse>>> {
    Ok(Json(state.genes.ingest().await?))
}

pub async fn list_requests(State(state): State<AppState>) -> Result<Json<Vec<IngestionRequest>>> {
    Ok(Json(state.genes.registry().list().await?))
}

pub async fn ingestion_stats(State(state): State<AppState>) -> Json<BulkStats> {
    Json(state.genes.stats())
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<GeneParams>,
) -> Result<Json<GeneResults>> {
    let query = GeneQuery {
        term: params.term,
        chromosome: params.chromosome,
        assembly_id: params
            .assembly_id
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(str::parse::<AssemblyId>)
            .transpose()?,
        size: params.size.unwrap_or(DEFAULT_SIZE),
    };
    Ok(Json(state.queries.genes(&query).await?))
}
