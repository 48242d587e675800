//! GTF annotation rows to gene documents.

use crate::documents::GeneDocument;
use crate::genotype::{is_valid_human_chromosome, normalize_chromosome};
use crate::types::AssemblyId;

const SEQNAME: usize = 0;
const FEATURE: usize = 2;
const START: usize = 3;
const END: usize = 4;
const ATTRIBUTES: usize = 8;

/// Parse one GTF row. Comments, non-`gene` features, non-human
/// chromosomes and rows without a `gene_name` attribute yield `None`.
pub fn parse_gene_row(line: &str, assembly_id: AssemblyId) -> Option<GeneDocument> {
    if line.starts_with('#') {
        return None;
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() <= ATTRIBUTES || fields[FEATURE] != "gene" {
        return None;
    }

    let chrom = normalize_chromosome(fields[SEQNAME].trim());
    if !is_valid_human_chromosome(chrom) {
        return None;
    }

    Some(GeneDocument {
        name: attribute(fields[ATTRIBUTES], "gene_name")?.to_string(),
        chrom: chrom.to_string(),
        start: parse_coordinate(fields[START]),
        end: parse_coordinate(fields[END]),
        assembly_id,
    })
}

/// Look up a `key "value";` attribute.
pub fn attribute<'a>(attributes: &'a str, key: &str) -> Option<&'a str> {
    attributes
        .split(';')
        .filter_map(|pair| pair.trim().split_once(' '))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.trim().trim_matches('"'))
}

fn parse_coordinate(raw: &str) -> i64 {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != ' ').collect();
    cleaned.parse().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENE_ROW: &str = "chr1\tHAVANA\tgene\t11869\t14409\t.\t+\t.\tgene_id \"ENSG00000223972.5\"; gene_type \"transcribed_unprocessed_pseudogene\"; gene_name \"DDX11L1\"; level 2;";

    #[test]
    fn test_parse_gene_row() {
        let gene = parse_gene_row(GENE_ROW, AssemblyId::Grch38).unwrap();
        assert_eq!(gene.name, "DDX11L1");
        assert_eq!(gene.chrom, "1");
        assert_eq!(gene.start, 11869);
        assert_eq!(gene.end, 14409);
        assert_eq!(gene.assembly_id, AssemblyId::Grch38);
    }

    #[test]
    fn test_non_gene_features_are_skipped() {
        let row = GENE_ROW.replacen("\tgene\t", "\ttranscript\t", 1);
        assert!(parse_gene_row(&row, AssemblyId::Grch38).is_none());
        assert!(parse_gene_row("##description: evidence-based annotation", AssemblyId::Grch38).is_none());
        assert!(parse_gene_row("chr1\tHAVANA\tgene", AssemblyId::Grch38).is_none());
    }

    #[test]
    fn test_non_human_chromosome_is_skipped() {
        let row = GENE_ROW.replacen("chr1", "GL000192.1", 1);
        assert!(parse_gene_row(&row, AssemblyId::Grch37).is_none());
    }

    #[test]
    fn test_coordinates_strip_separators() {
        assert_eq!(parse_coordinate("1,234 567"), 1234567);
        assert_eq!(parse_coordinate("abc"), -1);
    }

    #[test]
    fn test_attribute_lookup() {
        let attrs = "gene_id \"G1\"; gene_name \"BRCA1\";";
        assert_eq!(attribute(attrs, "gene_id"), Some("G1"));
        assert_eq!(attribute(attrs, "gene_name"), Some("BRCA1"));
        assert_eq!(attribute(attrs, "level"), None);
    }
}
