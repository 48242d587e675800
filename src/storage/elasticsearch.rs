//! Elasticsearch backend for the document store.
//!
//! Speaks the REST API directly:
//!
//! - `_bulk` with an NDJSON body for inserts
//! - `_search`, `_count` and `_delete_by_query` with JSON bodies
//! - optional basic auth on every request
//!
//! A missing index (404) reads as empty rather than failing, so queries
//! and gene replacement work before the first ingestion.

use super::{BulkItemOutcome, DocumentStore, Hit, SearchResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};

pub struct ElasticsearchStore {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl ElasticsearchStore {
    /// Create a new store client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Cluster URL (e.g., "http://localhost:9200")
    /// * `username` / `password` - Basic auth credentials, used when a username is set
    pub fn new(base_url: &str, username: Option<String>, password: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: username.map(|u| (u, password.unwrap_or_default())),
        })
    }

    fn endpoint(&self, index: &str, action: &str) -> String {
        format!("{}/{}/{}", self.base_url, index, action)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    /// Send a request and decode the JSON reply. `None` means the index is missing.
    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Option<Value>> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!("{} returned {}: {}", url, status, body)));
        }

        Ok(Some(response.json::<Value>().await?))
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Option<Value>> {
        let request = self.request(Method::POST, url).json(body);
        self.send(url, request).await
    }

    fn ndjson(documents: &[Value]) -> Result<Bytes> {
        let action = json!({"index": {}});
        let mut buf = Vec::new();
        for doc in documents {
            serde_json::to_writer(&mut buf, &action)?;
            buf.push(b'\n');
            serde_json::to_writer(&mut buf, doc)?;
            buf.push(b'\n');
        }
        Ok(Bytes::from(buf))
    }

    fn bulk_outcomes(reply: &Value, expected: usize) -> Vec<BulkItemOutcome> {
        let items = reply
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut outcomes: Vec<BulkItemOutcome> = items
            .iter()
            .map(|item| {
                let result = item.get("index").unwrap_or(item);
                let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
                if (200..300).contains(&status) {
                    BulkItemOutcome::Indexed
                } else {
                    let reason = result
                        .pointer("/error/reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("status {}", status));
                    BulkItemOutcome::Failed(reason)
                }
            })
            .collect();

        outcomes.resize(
            expected,
            BulkItemOutcome::Failed("no result returned for item".to_string()),
        );
        outcomes
    }

    fn search_response(reply: Value) -> SearchResponse {
        let total = match reply.pointer("/hits/total") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(obj) => obj.get("value").and_then(Value::as_u64).unwrap_or(0),
            None => 0,
        };

        let hits = reply
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .map(|hit| Hit {
                        id: hit.get("_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        source: hit.get("_source").cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default();

        SearchResponse {
            total,
            hits,
            aggregations: reply.get("aggregations").cloned().unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn bulk_index(&self, index: &str, documents: Vec<Value>) -> Result<Vec<BulkItemOutcome>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint(index, "_bulk");
        let request = self
            .request(Method::POST, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(Self::ndjson(&documents)?);

        let reply = self
            .send(&url, request)
            .await?
            .ok_or_else(|| Error::Store(format!("{} returned 404", url)))?;

        Ok(Self::bulk_outcomes(&reply, documents.len()))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        let url = self.endpoint(index, "_search");
        Ok(self
            .post_json(&url, body)
            .await?
            .map(Self::search_response)
            .unwrap_or_default())
    }

    async fn count(&self, index: &str, body: &Value) -> Result<u64> {
        let url = self.endpoint(index, "_count");
        Ok(self
            .post_json(&url, body)
            .await?
            .and_then(|reply| reply.get("count").and_then(Value::as_u64))
            .unwrap_or(0))
    }

    async fn delete_by_query(&self, index: &str, body: &Value) -> Result<u64> {
        let url = self.endpoint(index, "_delete_by_query?conflicts=proceed&refresh=true");
        Ok(self
            .post_json(&url, body)
            .await?
            .and_then(|reply| reply.get("deleted").and_then(Value::as_u64))
            .unwrap_or(0))
    }
}
