//! Document store abstraction.
//!
//! The ingestion pipelines and the query service only talk to the store
//! through [`DocumentStore`], so a search cluster and the in-process
//! [`MemoryStore`] can be used interchangeably.
//!
//! # Implementations
//!
//! - [`ElasticsearchStore`] - Elasticsearch REST API over HTTP
//! - [`MemoryStore`] - in-process store for tests and local runs
//!
//! # Example
//!
//! ```no_run
//! use vardex::storage::{DocumentStore, MemoryStore, VARIANTS_INDEX};
//! use serde_json::json;
//!
//! # async fn run() -> vardex::Result<()> {
//! let store = MemoryStore::new();
//! let count = store
//!     .count(VARIANTS_INDEX, &json!({"query": {"match_all": {}}}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod elasticsearch;
mod memory;

pub use elasticsearch::ElasticsearchStore;
pub use memory::MemoryStore;

use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub const VARIANTS_INDEX: &str = "variants";
pub const GENES_INDEX: &str = "genes";

/// Result of indexing one document of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkItemOutcome {
    Indexed,
    Failed(String),
}

impl BulkItemOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, BulkItemOutcome::Indexed)
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub source: Value,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<Hit>,
    pub aggregations: Value,
}

/// One bucket of a terms aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
}

/// Store backend trait used by ingestion and queries.
///
/// Request bodies follow the Elasticsearch query DSL.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a batch of documents, reporting an outcome per document in order.
    async fn bulk_index(&self, index: &str, documents: Vec<Value>) -> Result<Vec<BulkItemOutcome>>;

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse>;

    /// Count the documents matching `body["query"]`.
    async fn count(&self, index: &str, body: &Value) -> Result<u64>;

    /// Delete the documents matching `body["query"]`, returning how many went.
    async fn delete_by_query(&self, index: &str, body: &Value) -> Result<u64>;

    /// Run `body` and read the buckets of the terms aggregation `name`.
    async fn aggregate(&self, index: &str, body: &Value, name: &str) -> Result<Vec<Bucket>> {
        let response = self.search(index, body).await?;
        Ok(buckets(&response.aggregations, name))
    }
}

/// Extract `aggregations[name].buckets`; absent aggregations yield no buckets.
pub fn buckets(aggregations: &Value, name: &str) -> Vec<Bucket> {
    aggregations
        .get(name)
        .and_then(|agg| agg.get("buckets"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|bucket| Bucket {
                    key: match bucket.get("key") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    },
                    doc_count: bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}
