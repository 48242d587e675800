//! Documents written to the search store.
//!
//! Field names are camelCase on the wire; the query builders in
//! [`crate::query`] address them by these names.

use crate::types::{AssemblyId, Zygosity};
use serde::{Deserialize, Serialize};

/// One VCF row narrowed to a single sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantCallDocument {
    pub chrom: String,
    pub pos: i64,
    pub id: String,
    #[serde(rename = "ref")]
    pub reference: Vec<String>,
    pub alt: Vec<String>,
    pub format: Vec<String>,
    pub qual: i64,
    pub filter: String,
    #[serde(default)]
    pub info: Vec<Info>,
    pub sample: Sample,
    pub file_id: String,
    pub dataset: String,
    pub assembly_id: AssemblyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub variation: Variation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub genotype: Genotype,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genotype_probability: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phred_scale_likelihood: Vec<f64>,
    pub alleles: Alleles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genotype {
    pub phased: bool,
    pub zygosity: Zygosity,
    /// Raw allele indices; -1 marks a missing call.
    pub allele_left: i32,
    pub allele_right: i32,
}

/// The literal sequences the genotype's indices refer to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Alleles {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneDocument {
    pub name: String,
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub assembly_id: AssemblyId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variant_document_field_names() {
        let doc = VariantCallDocument {
            chrom: "1".into(),
            pos: 100,
            id: "none".into(),
            reference: vec!["G".into()],
            alt: vec!["A".into()],
            format: vec!["GT".into()],
            qual: -1,
            filter: "PASS".into(),
            info: vec![],
            sample: Sample {
                id: "S1".into(),
                variation: Variation {
                    genotype: Genotype {
                        phased: false,
                        zygosity: Zygosity::Heterozygous,
                        allele_left: 0,
                        allele_right: 1,
                    },
                    genotype_probability: vec![],
                    phred_scale_likelihood: vec![],
                    alleles: Alleles {
                        left: "G".into(),
                        right: "A".into(),
                    },
                },
            },
            file_id: "drs-1".into(),
            dataset: "ds".into(),
            assembly_id: AssemblyId::Grch38,
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["ref"], json!(["G"]));
        assert_eq!(value["assemblyId"], "GRCh38");
        assert_eq!(value["fileId"], "drs-1");
        assert_eq!(value["sample"]["variation"]["genotype"]["zygosity"], "HETEROZYGOUS");
        assert_eq!(value["sample"]["variation"]["genotype"]["alleleLeft"], 0);
        assert_eq!(value["sample"]["variation"]["alleles"]["right"], "A");
        assert!(value["sample"]["variation"].get("genotypeProbability").is_none());
    }

    #[test]
    fn test_variant_document_without_info_decodes() {
        let value = json!({
            "chrom": "X", "pos": 5, "id": "rs1", "ref": ["A"], "alt": ["T"],
            "format": ["GT"], "qual": 30, "filter": "PASS",
            "sample": {"id": "S2", "variation": {
                "genotype": {"phased": true, "zygosity": "HOMOZYGOUS_ALTERNATE",
                             "alleleLeft": 1, "alleleRight": 1},
                "alleles": {"left": "T", "right": "T"}}},
            "fileId": "f", "dataset": "d", "assemblyId": "GRCh37"
        });
        let doc: VariantCallDocument = serde_json::from_value(value).unwrap();
        assert!(doc.info.is_empty());
        assert_eq!(doc.assembly_id, AssemblyId::Grch37);
        assert!(doc.sample.variation.genotype.phased);
    }
}
