//! Gene search by name.

use crate::types::AssemblyId;
use serde_json::{Value, json};

pub const DEFAULT_SIZE: usize = 25;

#[derive(Debug, Clone)]
pub struct GeneQuery {
    /// Substring of the gene name
    pub term: String,
    pub chromosome: Option<String>,
    pub assembly_id: Option<AssemblyId>,
    pub size: usize,
}

impl Default for GeneQuery {
    fn default() -> Self {
        Self {
            term: String::new(),
            chromosome: None,
            assembly_id: None,
            size: DEFAULT_SIZE,
        }
    }
}

/// Name matches `*term*`; results ordered by chromosome, then start.
pub fn search_body(query: &GeneQuery) -> Value {
    let mut must = vec![json!({"wildcard": {"name.keyword": {"value": format!("*{}*", query.term.trim())}}})];

    if let Some(chrom) = query.chromosome.as_deref().filter(|c| !c.trim().is_empty()) {
        must.push(json!({"term": {"chrom.keyword": chrom.trim()}}));
    }
    if let Some(assembly_id) = query.assembly_id {
        must.push(json!({"term": {"assemblyId.keyword": assembly_id.as_str()}}));
    }

    json!({
        "query": {"bool": {"filter": [{"bool": {"must": must}}]}},
        "size": query.size,
        "sort": [
            {"chrom.keyword": {"order": "asc"}},
            {"start": {"order": "asc"}}
        ]
    })
}
