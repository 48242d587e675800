use super::{AppState, split_list};
use crate::indexing::BulkStats;
use crate::ingest::IngestOptions;
use crate::query::{Overview, VariantQuery, VariantResults, variants::DEFAULT_SIZE};
use crate::types::{AssemblyId, GenotypeQuery, IngestResponse, IngestionRequest, SortDirection};
use crate::{Error, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestParams {
    /// Comma separated, relative to the VCF directory
    pub file_names: Option<String>,
    /// Sub-directory whose `*.vcf.gz` files are all ingested
    pub directory: Option<String>,
    pub assembly_id: String,
    pub dataset: Option<String>,
    #[serde(default)]
    pub filter_out_references: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantParams {
    pub chromosome: Option<String>,
    pub lower_bound: Option<i64>,
    pub upper_bound: Option<i64>,
    /// Comma separated variant or sample ids, depending on the route
    pub ids: Option<String>,
    pub reference: Option<String>,
    pub alternative: Option<String>,
    /// Comma separated, at most two
    pub alleles: Option<String>,
    pub genotype: Option<String>,
    pub assembly_id: Option<String>,
    pub dataset: Option<String>,
    pub size: Option<usize>,
    pub sort_by_position: Option<String>,
    pub include_info_in_result_set: Option<bool>,
    pub get_sample_ids_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ResultGroup<T> {
    pub query: String,
    #[serde(flatten)]
    pub result: T,
}

#[derive(Debug, Serialize)]
pub struct Count {
    pub count: u64,
}

#[derive(Debug, Clone, Copy)]
enum IdField {
    Variant,
    Sample,
}

impl VariantParams {
    fn to_query(&self, field: IdField, id: Option<&str>) -> Result<VariantQuery> {
        let assembly_id: AssemblyId = self
            .assembly_id
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("assemblyId is required".to_string()))?
            .parse()?;

        let mut query = VariantQuery::new(assembly_id);
        query.chromosome = self.chromosome.clone();
        query.lower_bound = self.lower_bound;
        query.upper_bound = self.upper_bound;
        query.reference = self.reference.clone();
        query.alternative = self.alternative.clone();
        query.alleles = self.alleles.as_deref().map(split_list).unwrap_or_default();
        query.genotype = self
            .genotype
            .as_deref()
            .map(str::parse::<GenotypeQuery>)
            .transpose()?
            .unwrap_or_default();
        query.dataset = self.dataset.clone();
        query.size = self.size.unwrap_or(DEFAULT_SIZE);
        query.sort = self
            .sort_by_position
            .as_deref()
            .map(SortDirection::parse_lenient)
            .unwrap_or_default();
        query.include_info = self.include_info_in_result_set.unwrap_or(true);
        query.sample_ids_only = self.get_sample_ids_only.unwrap_or(false);

        let id = id.map(str::to_string);
        match field {
            IdField::Variant => query.variant_id = id,
            IdField::Sample => query.sample_id = id,
        }
        Ok(query)
    }

    /// One query per requested id, or a single unfiltered one.
    fn queries(&self, field: IdField) -> Result<Vec<(String, VariantQuery)>> {
        let ids = self.ids.as_deref().map(split_list).unwrap_or_default();
        if ids.is_empty() {
            return Ok(vec![("*".to_string(), self.to_query(field, None)?)]);
        }
        ids.into_iter()
            .map(|id| {
                let query = self.to_query(field, Some(&id))?;
                Ok((id, query))
            })
            .collect()
    }
}

pub async fn run_ingestion(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
) -> Result<Json<Vec<IngestResponse>>> {
    let options = IngestOptions {
        assembly_id: params.assembly_id.parse()?,
        dataset: params.dataset.unwrap_or_default(),
        filter_out_homozygous_references: params.filter_out_references,
    };

    let responses = match (params.directory, params.file_names) {
        (Some(directory), _) if !directory.trim().is_empty() => {
            state.variants.ingest_directory(&directory, options).await?
        }
        (_, Some(file_names)) => {
            let file_names = split_list(&file_names);
            if file_names.is_empty() {
                return Err(Error::InvalidInput("missing 'fileNames' query parameter".to_string()));
            }
            state.variants.ingest(&file_names, options).await?
        }
        _ => {
            return Err(Error::InvalidInput(
                "either 'fileNames' or 'directory' is required".to_string(),
            ));
        }
    };
    Ok(Json(responses))
}

pub async fn list_requests(State(state): State<AppState>) -> Result<Json<Vec<IngestionRequest>>> {
    Ok(Json(state.variants.registry().list().await?))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IngestionRequest>> {
    state
        .variants
        .registry()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("ingestion request {}", id)))
}

pub async fn ingestion_stats(State(state): State<AppState>) -> Json<BulkStats> {
    Json(state.variants.stats())
}

pub async fn get_by_variant_id(
    State(state): State<AppState>,
    Query(params): Query<VariantParams>,
) -> Result<Json<Vec<ResultGroup<VariantResults>>>> {
    search(&state, &params, IdField::Variant).await
}

pub async fn get_by_sample_id(
    State(state): State<AppState>,
    Query(params): Query<VariantParams>,
) -> Result<Json<Vec<ResultGroup<VariantResults>>>> {
    search(&state, &params, IdField::Sample).await
}

pub async fn count_by_variant_id(
    State(state): State<AppState>,
    Query(params): Query<VariantParams>,
) -> Result<Json<Vec<ResultGroup<Count>>>> {
    count(&state, &params, IdField::Variant).await
}

pub async fn count_by_sample_id(
    State(state): State<AppState>,
    Query(params): Query<VariantParams>,
) -> Result<Json<Vec<ResultGroup<Count>>>> {
    count(&state, &params, IdField::Sample).await
}

pub async fn overview(State(state): State<AppState>) -> Result<Json<Overview>> {
    Ok(Json(state.queries.overview().await?))
}

pub async fn delete_dataset(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> Result<Json<Count>> {
    let count = state.queries.delete_variants_by_dataset(&dataset).await?;
    Ok(Json(Count { count }))
}

async fn search(
    state: &AppState,
    params: &VariantParams,
    field: IdField,
) -> Result<Json<Vec<ResultGroup<VariantResults>>>> {
    let mut groups = Vec::new();
    for (label, query) in params.queries(field)? {
        let result = state.queries.variants(&query).await?;
        groups.push(ResultGroup { query: label, result });
    }
    Ok(Json(groups))
}

async fn count(
    state: &AppState,
    params: &VariantParams,
    field: IdField,
) -> Result<Json<Vec<ResultGroup<Count>>>> {
    let mut groups = Vec::new();
    for (label, query) in params.queries(field)? {
        let count = state.queries.count(&query).await?;
        groups.push(ResultGroup {
            query: label,
            result: Count { count },
        });
    }
    Ok(Json(groups))
}
