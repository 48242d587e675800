//! Variant query construction.
//!
//! Builds Elasticsearch request bodies from validated parameters. All
//! filters sit inside `bool.filter[0].bool`: conjunctive clauses under
//! `must`, the allele group under `should` with `minimum_should_match`.

use crate::types::{AssemblyId, GenotypeQuery, Ploidy, SortDirection, Zygosity};
use serde_json::{Value, json};

pub const DEFAULT_SIZE: usize = 100;
/// Aggregation name used by the sample-ids-only mode.
pub const SAMPLE_IDS_AGG: &str = "sampleIds";
const SAMPLE_IDS_AGG_SIZE: usize = 10_000;

/// Allele wildcard token accepted from callers.
pub const ALLELE_WILDCARD: char = 'N';

const ZYGOSITY: &str = "sample.variation.genotype.zygosity.keyword";
const ALLELE_LEFT_INDEX: &str = "sample.variation.genotype.alleleLeft";
const LEFT_ALLELE: &str = "sample.variation.alleles.left.keyword";
const RIGHT_ALLELE: &str = "sample.variation.alleles.right.keyword";

#[derive(Debug, Clone)]
pub struct VariantQuery {
    pub chromosome: Option<String>,
    pub lower_bound: Option<i64>,
    pub upper_bound: Option<i64>,
    pub variant_id: Option<String>,
    pub sample_id: Option<String>,
    pub dataset: Option<String>,
    pub reference: Option<String>,
    pub alternative: Option<String>,
    /// Up to two allele patterns matched against the resolved pair.
    pub alleles: Vec<String>,
    pub genotype: GenotypeQuery,
    pub assembly_id: AssemblyId,
    pub size: usize,
    pub sort: SortDirection,
    pub include_info: bool,
    pub sample_ids_only: bool,
}

impl VariantQuery {
    pub fn new(assembly_id: AssemblyId) -> Self {
        Self {
            chromosome: None,
            lower_bound: None,
            upper_bound: None,
            variant_id: None,
            sample_id: None,
            dataset: None,
            reference: None,
            alternative: None,
            alleles: Vec::new(),
            genotype: GenotypeQuery::Uncalled,
            assembly_id,
            size: DEFAULT_SIZE,
            sort: SortDirection::Ascending,
            include_info: true,
            sample_ids_only: false,
        }
    }
}

/// The filter part shared by searches and counts.
pub fn filter_query(query: &VariantQuery) -> Value {
    let mut must = Vec::new();

    let keyword_fields = [
        ("chrom.keyword", &query.chromosome),
        ("id.keyword", &query.variant_id),
        ("sample.id.keyword", &query.sample_id),
        ("dataset.keyword", &query.dataset),
    ];
    for (field, value) in keyword_fields {
        if let Some(value) = non_empty(value) {
            must.push(term(field, value));
        }
    }

    for (field, pattern) in [("ref.keyword", &query.reference), ("alt.keyword", &query.alternative)] {
        if let Some(pattern) = non_empty(pattern) {
            must.push(allele_clause(field, pattern));
        }
    }

    must.push(term("assemblyId.keyword", query.assembly_id.as_str()));

    if let Some(upper) = query.upper_bound {
        must.push(json!({"range": {"pos": {"lte": upper}}}));
    }
    if let Some(lower) = query.lower_bound {
        must.push(json!({"range": {"pos": {"gte": lower}}}));
    }

    if let Some(zygosity) = query.genotype.zygosity() {
        must.extend(genotype_clauses(zygosity));
    }

    let should = allele_group(&query.alleles, query.genotype.ploidy());
    let minimum_should_match = if should.is_empty() { 0 } else { 1 };

    json!({
        "bool": {
            "filter": [{
                "bool": {
                    "must": must,
                    "should": should,
                    "minimum_should_match": minimum_should_match
                }
            }]
        }
    })
}

/// Search body: documents, or only sample-id buckets.
pub fn search_body(query: &VariantQuery) -> Value {
    let mut body = json!({
        "query": filter_query(query),
        "sort": [{"pos": {"order": query.sort.as_str()}}],
    });

    if query.sample_ids_only {
        body["size"] = json!(0);
        body["aggs"] = json!({
            SAMPLE_IDS_AGG: {
                "terms": {"field": "sample.id.keyword", "size": SAMPLE_IDS_AGG_SIZE}
            }
        });
    } else {
        let excludes: Vec<&str> = if query.include_info { vec![] } else { vec!["info"] };
        body["size"] = json!(query.size);
        body["_source"] = json!({"includes": ["*"], "excludes": excludes});
    }
    body
}

pub fn count_body(query: &VariantQuery) -> Value {
    json!({ "query": filter_query(query) })
}

/// Zygosity equality, plus the left-index constraint for homozygous classes.
///
/// The `alleleLeft >= 0` clause on homozygous-alternate only excludes
/// missing calls; it does not tell homozygous-alternate apart from a
/// heterozygous pair on its own.
fn genotype_clauses(zygosity: Zygosity) -> Vec<Value> {
    let mut clauses = vec![term(ZYGOSITY, zygosity.as_str())];
    match zygosity {
        Zygosity::HomozygousReference => clauses.push(term(ALLELE_LEFT_INDEX, 0)),
        Zygosity::HomozygousAlternate => {
            clauses.push(json!({"range": {ALLELE_LEFT_INDEX: {"gte": 0}}}))
        }
        _ => {}
    }
    clauses
}

fn allele_group(alleles: &[String], ploidy: Ploidy) -> Vec<Value> {
    let alleles: Vec<&str> = alleles
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();

    match (ploidy, alleles.as_slice()) {
        (_, []) => Vec::new(),
        (Ploidy::Haploid, alleles) => alleles
            .iter()
            .map(|allele| both(allele_clause(LEFT_ALLELE, allele), term(RIGHT_ALLELE, "")))
            .collect(),
        (Ploidy::Diploid, [allele]) => vec![
            allele_clause(LEFT_ALLELE, allele),
            allele_clause(RIGHT_ALLELE, allele),
        ],
        (Ploidy::Diploid, [first, second, ..]) => vec![
            both(allele_clause(LEFT_ALLELE, first), allele_clause(RIGHT_ALLELE, second)),
            both(allele_clause(LEFT_ALLELE, second), allele_clause(RIGHT_ALLELE, first)),
        ],
    }
}

/// Exact match, or a wildcard query when the pattern carries `N` or `*`.
fn allele_clause(field: &str, pattern: &str) -> Value {
    if pattern.contains(ALLELE_WILDCARD) || pattern.contains('*') {
        let translated = pattern.replace(ALLELE_WILDCARD, "?");
        json!({"wildcard": {field: {"value": translated}}})
    } else {
        term(field, pattern)
    }
}

fn both(left: Value, right: Value) -> Value {
    json!({"bool": {"must": [left, right]}})
}

fn term(field: &str, value: impl Into<Value>) -> Value {
    json!({"term": {field: value.into()}})
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must(body: &Value) -> Vec<Value> {
        body.pointer("/bool/filter/0/bool/must")
            .and_then(Value::as_array)
            .cloned()
            .unwrap()
    }

    fn should(body: &Value) -> Vec<Value> {
        body.pointer("/bool/filter/0/bool/should")
            .and_then(Value::as_array)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_independent_must_clauses() {
        let mut query = VariantQuery::new(AssemblyId::Grch38);
        query.chromosome = Some("1".into());
        query.sample_id = Some("NA12878".into());
        query.dataset = Some("".into());
        query.lower_bound = Some(100);

        let clauses = must(&filter_query(&query));
        assert!(clauses.contains(&json!({"term": {"chrom.keyword": "1"}})));
        assert!(clauses.contains(&json!({"term": {"sample.id.keyword": "NA12878"}})));
        assert!(clauses.contains(&json!({"term": {"assemblyId.keyword": "GRCh38"}})));
        assert!(clauses.contains(&json!({"range": {"pos": {"gte": 100}}})));
        assert!(!clauses.iter().any(|c| c.to_string().contains("dataset")));
        assert!(!clauses.iter().any(|c| c.to_string().contains("lte")));
    }

    #[test]
    fn test_genotype_disambiguation() {
        let mut query = VariantQuery::new(AssemblyId::Grch37);
        query.genotype = GenotypeQuery::HomozygousReference;
        let clauses = must(&filter_query(&query));
        assert!(clauses.contains(&json!({"term": {ZYGOSITY: "HOMOZYGOUS_REFERENCE"}})));
        assert!(clauses.contains(&json!({"term": {ALLELE_LEFT_INDEX: 0}})));

        query.genotype = GenotypeQuery::HomozygousAlternate;
        let clauses = must(&filter_query(&query));
        assert!(clauses.contains(&json!({"range": {ALLELE_LEFT_INDEX: {"gte": 0}}})));

        query.genotype = GenotypeQuery::Heterozygous;
        assert_eq!(must(&filter_query(&query)).len(), 2);
    }

    #[test]
    fn test_haploid_allele_group() {
        let mut query = VariantQuery::new(AssemblyId::Grch38);
        query.genotype = GenotypeQuery::Reference;
        query.alleles = vec!["A".into()];

        let body = filter_query(&query);
        assert_eq!(
            should(&body),
            vec![json!({"bool": {"must": [
                {"term": {LEFT_ALLELE: "A"}},
                {"term": {RIGHT_ALLELE: ""}}
            ]}})]
        );
        assert_eq!(body.pointer("/bool/filter/0/bool/minimum_should_match"), Some(&json!(1)));
    }

    #[test]
    fn test_diploid_allele_groups() {
        let mut query = VariantQuery::new(AssemblyId::Grch38);
        query.alleles = vec!["A".into()];
        assert_eq!(
            should(&filter_query(&query)),
            vec![json!({"term": {LEFT_ALLELE: "A"}}), json!({"term": {RIGHT_ALLELE: "A"}})]
        );

        query.alleles = vec!["A".into(), "T".into()];
        let group = should(&filter_query(&query));
        assert_eq!(group.len(), 2);
        assert_eq!(group[1]["bool"]["must"][0], json!({"term": {LEFT_ALLELE: "T"}}));
        assert_eq!(group[1]["bool"]["must"][1], json!({"term": {RIGHT_ALLELE: "A"}}));
    }

    #[test]
    fn test_no_alleles_means_no_should() {
        let body = filter_query(&VariantQuery::new(AssemblyId::Grch38));
        assert!(should(&body).is_empty());
        assert_eq!(body.pointer("/bool/filter/0/bool/minimum_should_match"), Some(&json!(0)));
    }

    #[test]
    fn test_allele_wildcard() {
        assert_eq!(
            allele_clause(LEFT_ALLELE, "ANG"),
            json!({"wildcard": {LEFT_ALLELE: {"value": "A?G"}}})
        );
        assert_eq!(allele_clause("ref.keyword", "AC"), json!({"term": {"ref.keyword": "AC"}}));
    }

    #[test]
    fn test_search_body_modes() {
        let mut query = VariantQuery::new(AssemblyId::Grch38);
        query.sort = SortDirection::Descending;
        query.include_info = false;

        let body = search_body(&query);
        assert_eq!(body["size"], 100);
        assert_eq!(body["sort"][0]["pos"]["order"], "desc");
        assert_eq!(body["_source"]["excludes"], json!(["info"]));

        query.sample_ids_only = true;
        let body = search_body(&query);
        assert_eq!(body["size"], 0);
        assert_eq!(body["aggs"][SAMPLE_IDS_AGG]["terms"]["field"], "sample.id.keyword");
        assert!(body.get("_source").is_none());
    }
}
