//! Query construction and execution against the document store.

pub mod genes;
pub mod variants;

pub use genes::GeneQuery;
pub use variants::VariantQuery;

use crate::documents::GeneDocument;
use crate::storage::{Bucket, DocumentStore, GENES_INDEX, VARIANTS_INDEX, buckets};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const OVERVIEW_BUCKETS: usize = 10_000;

/// Variant search results: documents, or sample-id buckets.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum VariantResults {
    Documents { total: u64, results: Vec<Value> },
    SampleIds { results: Vec<Bucket> },
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneResults {
    pub total: u64,
    pub results: Vec<GeneDocument>,
}

/// Document counts per value of the main keyword fields.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub chromosomes: BTreeMap<String, u64>,
    #[serde(rename = "variantIDs")]
    pub variant_ids: BTreeMap<String, u64>,
    #[serde(rename = "sampleIDs")]
    pub sample_ids: BTreeMap<String, u64>,
    #[serde(rename = "assemblyIDs")]
    pub assembly_ids: BTreeMap<String, u64>,
    pub datasets: BTreeMap<String, u64>,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn DocumentStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn variants(&self, query: &VariantQuery) -> Result<VariantResults> {
        let body = variants::search_body(query);
        debug!("variant search: {}", body);

        if query.sample_ids_only {
            let results = self
                .store
                .aggregate(VARIANTS_INDEX, &body, variants::SAMPLE_IDS_AGG)
                .await?;
            return Ok(VariantResults::SampleIds { results });
        }

        let response = self.store.search(VARIANTS_INDEX, &body).await?;
        Ok(VariantResults::Documents {
            total: response.total,
            results: response.hits.into_iter().map(|hit| hit.source).collect(),
        })
    }

    pub async fn count(&self, query: &VariantQuery) -> Result<u64> {
        self.store
            .count(VARIANTS_INDEX, &variants::count_body(query))
            .await
    }

    pub async fn genes(&self, query: &GeneQuery) -> Result<GeneResults> {
        let response = self
            .store
            .search(GENES_INDEX, &genes::search_body(query))
            .await?;

        let results = response
            .hits
            .into_iter()
            .map(|hit| serde_json::from_value(hit.source))
            .collect::<std::result::Result<Vec<GeneDocument>, _>>()
            .map_err(|e| Error::Store(format!("unexpected gene document: {}", e)))?;

        Ok(GeneResults {
            total: response.total,
            results,
        })
    }

    pub async fn overview(&self) -> Result<Overview> {
        let fields = [
            ("chromosomes", "chrom.keyword"),
            ("variantIDs", "id.keyword"),
            ("sampleIDs", "sample.id.keyword"),
            ("assemblyIDs", "assemblyId.keyword"),
            ("datasets", "dataset.keyword"),
        ];

        let aggs: serde_json::Map<String, Value> = fields
            .iter()
            .map(|(name, field)| {
                (
                    name.to_string(),
                    json!({"terms": {"field": field, "size": OVERVIEW_BUCKETS}}),
                )
            })
            .collect();
        let body = json!({"size": 0, "aggs": aggs});

        let response = self.store.search(VARIANTS_INDEX, &body).await?;
        let counts = |name: &str| -> BTreeMap<String, u64> {
            buckets(&response.aggregations, name)
                .into_iter()
                .map(|b| (b.key, b.doc_count))
                .collect()
        };

        Ok(Overview {
            chromosomes: counts("chromosomes"),
            variant_ids: counts("variantIDs"),
            sample_ids: counts("sampleIDs"),
            assembly_ids: counts("assemblyIDs"),
            datasets: counts("datasets"),
        })
    }

    pub async fn delete_variants_by_dataset(&self, dataset: &str) -> Result<u64> {
        if dataset.trim().is_empty() {
            return Err(Error::InvalidInput("dataset is required".to_string()));
        }

        let body = json!({"query": {"term": {"dataset.keyword": dataset.trim()}}});
        let deleted = self.store.delete_by_query(VARIANTS_INDEX, &body).await?;
        info!("deleted {} variant documents of dataset {}", deleted, dataset);
        Ok(deleted)
    }
}
