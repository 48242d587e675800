//! In-process document store.
//!
//! Evaluates the part of the query DSL the query builders emit:
//! `bool` (`must`, `filter`, `should`, `must_not`, `minimum_should_match`),
//! `term`, `match`, `wildcard`, `range` and `match_all`, plus `sort`,
//! `from`/`size`, `_source.excludes` and `terms` aggregations.
//!
//! Field paths may carry a `.keyword` suffix; a clause on a path that
//! crosses an array matches when any element matches.

use super::{BulkItemOutcome, DocumentStore, Hit, SearchResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

const DEFAULT_SIZE: usize = 10;

#[derive(Default)]
pub struct MemoryStore {
    indexes: RwLock<HashMap<String, Vec<Hit>>>,
    bulk_delay: Option<Duration>,
    reject_bulk: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering every bulk request.
    pub fn with_bulk_delay(mut self, delay: Duration) -> Self {
        self.bulk_delay = Some(delay);
        self
    }

    /// Make every bulk item fail until switched off again.
    pub fn reject_bulk(&self, reject: bool) {
        self.reject_bulk.store(reject, AtomicOrdering::SeqCst);
    }

    /// Snapshot of every stored source in an index.
    pub async fn documents(&self, index: &str) -> Vec<Value> {
        self.indexes
            .read()
            .await
            .get(index)
            .map(|hits| hits.iter().map(|h| h.source.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn len(&self, index: &str) -> usize {
        self.indexes.read().await.get(index).map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn bulk_index(&self, index: &str, documents: Vec<Value>) -> Result<Vec<BulkItemOutcome>> {
        if let Some(delay) = self.bulk_delay {
            tokio::time::sleep(delay).await;
        }

        if self.reject_bulk.load(AtomicOrdering::SeqCst) {
            return Ok(documents
                .iter()
                .map(|_| BulkItemOutcome::Failed("bulk rejected".to_string()))
                .collect());
        }

        let mut indexes = self.indexes.write().await;
        let stored = indexes.entry(index.to_string()).or_default();

        let mut outcomes = Vec::with_capacity(documents.len());
        for source in documents {
            if source.is_object() {
                stored.push(Hit {
                    id: Uuid::new_v4().to_string(),
                    source,
                });
                outcomes.push(BulkItemOutcome::Indexed);
            } else {
                outcomes.push(BulkItemOutcome::Failed("document is not an object".to_string()));
            }
        }
        Ok(outcomes)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        let query = query_of(body);
        let indexes = self.indexes.read().await;

        let mut matched: Vec<&Hit> = indexes
            .get(index)
            .map(|hits| hits.iter().filter(|h| matches(query, &h.source)).collect())
            .unwrap_or_default();

        let aggregations = match body.get("aggs").or_else(|| body.get("aggregations")) {
            Some(aggs) => aggregate(aggs, &matched)?,
            None => Value::Null,
        };

        if let Some(sort) = body.get("sort") {
            let keys = sort_keys(sort);
            matched.sort_by(|a, b| compare_by(&keys, &a.source, &b.source));
        }

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_SIZE, |s| s as usize);
        let excludes = source_excludes(body);

        let hits = matched
            .iter()
            .skip(from)
            .take(size)
            .map(|hit| {
                let mut source = hit.source.clone();
                for path in &excludes {
                    remove_path(&mut source, path);
                }
                Hit {
                    id: hit.id.clone(),
                    source,
                }
            })
            .collect();

        Ok(SearchResponse {
            total: matched.len() as u64,
            hits,
            aggregations,
        })
    }

    async fn count(&self, index: &str, body: &Value) -> Result<u64> {
        let query = query_of(body);
        let indexes = self.indexes.read().await;
        Ok(indexes
            .get(index)
            .map_or(0, |hits| hits.iter().filter(|h| matches(query, &h.source)).count()) as u64)
    }

    async fn delete_by_query(&self, index: &str, body: &Value) -> Result<u64> {
        let query = query_of(body);
        let mut indexes = self.indexes.write().await;
        let Some(hits) = indexes.get_mut(index) else {
            return Ok(0);
        };

        let before = hits.len();
        hits.retain(|h| !matches(query, &h.source));
        Ok((before - hits.len()) as u64)
    }
}

static MATCH_ALL: Value = Value::Null;

fn query_of(body: &Value) -> &Value {
    body.get("query").unwrap_or(&MATCH_ALL)
}

/// Evaluate a query clause against a document. A null query matches everything.
fn matches(query: &Value, doc: &Value) -> bool {
    let Some(clause) = query.as_object() else {
        return query.is_null();
    };
    let Some((kind, body)) = clause.iter().next() else {
        return true;
    };

    match kind.as_str() {
        "match_all" => true,
        "bool" => matches_bool(body, doc),
        "term" => field_clause(body, doc, "value", |actual, expected| {
            scalar_eq(actual, expected, false)
        }),
        "match" => field_clause(body, doc, "query", |actual, expected| {
            scalar_eq(actual, expected, true)
        }),
        "wildcard" => field_clause(body, doc, "value", |actual, pattern| {
            match (actual.as_str(), pattern.as_str()) {
                (Some(text), Some(pattern)) => wildcard_match(pattern, text),
                _ => false,
            }
        }),
        "range" => matches_range(body, doc),
        _ => false,
    }
}

fn clauses(body: &Value, key: &str) -> Vec<Value> {
    match body.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(single @ Value::Object(_)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn matches_bool(body: &Value, doc: &Value) -> bool {
    let must = clauses(body, "must");
    let filter = clauses(body, "filter");
    let should = clauses(body, "should");
    let must_not = clauses(body, "must_not");

    if !must.iter().chain(filter.iter()).all(|q| matches(q, doc)) {
        return false;
    }
    if must_not.iter().any(|q| matches(q, doc)) {
        return false;
    }

    let default_minimum = if must.is_empty() && filter.is_empty() && !should.is_empty() {
        1
    } else {
        0
    };
    let minimum = body
        .get("minimum_should_match")
        .and_then(Value::as_u64)
        .map_or(default_minimum, |m| m as usize);

    should.iter().filter(|q| matches(q, doc)).count() >= minimum
}

/// `{field: expected}` or `{field: {<key>: expected}}`
fn field_clause<F>(body: &Value, doc: &Value, key: &str, test: F) -> bool
where
    F: Fn(&Value, &Value) -> bool,
{
    let Some((field, spec)) = body.as_object().and_then(|o| o.iter().next()) else {
        return false;
    };
    let expected = match spec {
        Value::Object(inner) => match inner.get(key) {
            Some(v) => v,
            None => return false,
        },
        other => other,
    };

    field_values(doc, field).into_iter().any(|actual| test(actual, expected))
}

fn matches_range(body: &Value, doc: &Value) -> bool {
    let Some((field, bounds)) = body.as_object().and_then(|o| o.iter().next()) else {
        return false;
    };

    field_values(doc, field).into_iter().any(|actual| {
        let Some(value) = actual.as_f64() else {
            return false;
        };
        let bound = |name: &str| bounds.get(name).and_then(Value::as_f64);
        bound("gte").is_none_or(|b| value >= b)
            && bound("gt").is_none_or(|b| value > b)
            && bound("lte").is_none_or(|b| value <= b)
            && bound("lt").is_none_or(|b| value < b)
    })
}

/// Leaf values under a dotted path, flattening arrays on the way.
fn field_values<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let path = path.strip_suffix(".keyword").unwrap_or(path);

    let mut current = vec![doc];
    for part in path.split('.') {
        current = current
            .into_iter()
            .flat_map(|value| match value {
                Value::Array(items) => items.iter().filter_map(|i| i.get(part)).collect(),
                other => other.get(part).into_iter().collect::<Vec<_>>(),
            })
            .collect();
    }

    current
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect()
}

fn scalar_eq(actual: &Value, expected: &Value, ignore_case: bool) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) if ignore_case => a.eq_ignore_ascii_case(b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::String(b)) | (Value::String(b), Value::Number(a)) => {
            b.parse::<f64>().ok() == a.as_f64()
        }
        (a, b) => a == b,
    }
}

/// `?` matches one character, `*` any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

fn sort_keys(sort: &Value) -> Vec<(String, bool)> {
    let entries = match sort {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(field) => Some((field.clone(), false)),
            Value::Object(obj) => obj.iter().next().map(|(field, spec)| {
                let order = spec.get("order").or(Some(spec)).and_then(Value::as_str);
                (field.clone(), order == Some("desc"))
            }),
            _ => None,
        })
        .collect()
}

fn compare_by(keys: &[(String, bool)], a: &Value, b: &Value) -> Ordering {
    for (field, descending) in keys {
        let left = field_values(a, field).into_iter().next();
        let right = field_values(b, field).into_iter().next();

        let ordering = match (left, right) {
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r);
                if *descending { ord.reverse() } else { ord }
            }
            // Missing values sort last in both directions.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => bucket_key(a).cmp(&bucket_key(b)),
    }
}

fn bucket_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn aggregate(aggs: &Value, matched: &[&Hit]) -> Result<Value> {
    let Some(aggs) = aggs.as_object() else {
        return Err(Error::InvalidInput("aggs must be an object".to_string()));
    };

    let mut result = Map::new();
    for (name, spec) in aggs {
        let Some(terms) = spec.get("terms") else {
            return Err(Error::InvalidInput(format!(
                "unsupported aggregation {}",
                name
            )));
        };
        let field = terms.get("field").and_then(Value::as_str).unwrap_or_default();
        let size = terms
            .get("size")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_SIZE, |s| s as usize);

        let mut counts: HashMap<String, u64> = HashMap::new();
        for hit in matched {
            let mut seen: Vec<String> = field_values(&hit.source, field)
                .into_iter()
                .map(bucket_key)
                .collect();
            seen.sort();
            seen.dedup();
            for key in seen {
                *counts.entry(key).or_default() += 1;
            }
        }

        let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        buckets.truncate(size);

        let buckets: Vec<Value> = buckets
            .into_iter()
            .map(|(key, doc_count)| json!({"key": key, "doc_count": doc_count}))
            .collect();
        result.insert(name.clone(), json!({ "buckets": buckets }));
    }

    Ok(Value::Object(result))
}

fn source_excludes(body: &Value) -> Vec<String> {
    body.pointer("/_source/excludes")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn remove_path(source: &mut Value, path: &str) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    let mut current = source;
    for part in parts {
        match current.get_mut(part) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(obj) = current.as_object_mut() {
        obj.remove(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(chrom: &str, pos: i64, sample: &str, left: &str, right: &str) -> Value {
        json!({
            "chrom": chrom,
            "pos": pos,
            "info": [{"id": "DP", "value": "4"}],
            "sample": {
                "id": sample,
                "variation": {"alleles": {"left": left, "right": right}}
            },
            "assemblyId": "GRCh38"
        })
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .bulk_index(
                "variants",
                vec![
                    variant("1", 300, "S1", "A", "T"),
                    variant("1", 100, "S2", "A", ""),
                    variant("2", 200, "S1", "G", "G"),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_term_and_range() {
        let store = seeded().await;
        let body = json!({"query": {"bool": {"filter": [
            {"term": {"chrom.keyword": "1"}},
            {"range": {"pos": {"gte": 150}}}
        ]}}});
        assert_eq!(store.count("variants", &body).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_should_with_minimum() {
        let store = seeded().await;
        let body = json!({"query": {"bool": {
            "must": [{"term": {"assemblyId.keyword": "GRCh38"}}],
            "should": [
                {"term": {"sample.variation.alleles.left.keyword": "G"}},
                {"term": {"sample.variation.alleles.right.keyword": "T"}}
            ],
            "minimum_should_match": 1
        }}});
        assert_eq!(store.count("variants", &body).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sort_size_and_excludes() {
        let store = seeded().await;
        let body = json!({
            "query": {"match_all": {}},
            "sort": [{"pos": {"order": "desc"}}],
            "size": 2,
            "_source": {"excludes": ["info"]}
        });
        let response = store.search("variants", &body).await.unwrap();
        assert_eq!(response.total, 3);
        let positions: Vec<_> = response.hits.iter().map(|h| h.source["pos"].clone()).collect();
        assert_eq!(positions, vec![json!(300), json!(200)]);
        assert!(response.hits[0].source.get("info").is_none());
    }

    #[tokio::test]
    async fn test_terms_aggregation() {
        let store = seeded().await;
        let body = json!({
            "size": 0,
            "aggs": {"sampleIds": {"terms": {"field": "sample.id.keyword", "size": 10000}}}
        });
        let buckets = store.aggregate("variants", &body, "sampleIds").await.unwrap();
        assert_eq!(buckets[0].key, "S1");
        assert_eq!(buckets[0].doc_count, 2);
        assert_eq!(buckets[1].key, "S2");
    }

    #[tokio::test]
    async fn test_delete_by_query() {
        let store = seeded().await;
        let body = json!({"query": {"term": {"sample.id": "S1"}}});
        assert_eq!(store.delete_by_query("variants", &body).await.unwrap(), 2);
        assert_eq!(store.len("variants").await, 1);
        assert_eq!(store.delete_by_query("genes", &body).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejected_bulk_reports_failures() {
        let store = MemoryStore::new();
        store.reject_bulk(true);
        let outcomes = store.bulk_index("genes", vec![json!({"name": "A"})]).await.unwrap();
        assert!(!outcomes[0].is_indexed());
        assert_eq!(store.len("genes").await, 0);
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("A?G", "ATG"));
        assert!(!wildcard_match("A?G", "ATTG"));
        assert!(wildcard_match("*BRCA*", "xBRCA1"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("?", ""));
    }

    #[test]
    fn test_field_values_cross_arrays() {
        let doc = json!({"info": [{"id": "DP"}, {"id": "AF"}]});
        let ids: Vec<_> = field_values(&doc, "info.id").into_iter().cloned().collect();
        assert_eq!(ids, vec![json!("DP"), json!("AF")]);
    }
}
