//! Genotype encoders: raw VCF genotype text to the zygosity data model.

use crate::types::Zygosity;
use thiserror::Error;

/// Allele index recorded for a `.` or otherwise unparseable call.
pub const MISSING: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("allele index {index} out of range (ref: {ref_count}, alt: {alt_count})")]
pub struct AlleleIndexError {
    pub index: i32,
    pub ref_count: usize,
    pub alt_count: usize,
}

/// A decoded `GT` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenotypeCall {
    pub left: i32,
    /// `None` for haploid calls written without a separator (e.g. `1`).
    pub right: Option<i32>,
    pub phased: bool,
}

impl GenotypeCall {
    pub fn zygosity(&self) -> Zygosity {
        match self.right {
            Some(right) => derive_zygosity(self.left, right),
            None => haploid_zygosity(self.left),
        }
    }

    /// Right index as stored in documents.
    pub fn right_or_missing(&self) -> i32 {
        self.right.unwrap_or(MISSING)
    }
}

/// Classify a diploid call from its two allele indices.
pub fn derive_zygosity(left: i32, right: i32) -> Zygosity {
    if left == MISSING || right == MISSING {
        return Zygosity::Unknown;
    }
    if left == right {
        if left == 0 {
            Zygosity::HomozygousReference
        } else {
            Zygosity::HomozygousAlternate
        }
    } else {
        Zygosity::Heterozygous
    }
}

pub fn haploid_zygosity(allele: i32) -> Zygosity {
    match allele {
        MISSING => Zygosity::Unknown,
        0 => Zygosity::Reference,
        _ => Zygosity::Alternate,
    }
}

/// Decode a `GT` field. `|` marks a phased call, `/` an unphased one.
pub fn parse_genotype_field(raw: &str) -> GenotypeCall {
    let phased = raw.contains('|');
    let separator = if phased { '|' } else { '/' };

    let mut sides = raw.split(separator);
    let left = sides.next().map(parse_allele_index).unwrap_or(MISSING);
    let right = sides.next().map(parse_allele_index);

    GenotypeCall {
        left,
        right,
        phased,
    }
}

fn parse_allele_index(raw: &str) -> i32 {
    match raw {
        "." => MISSING,
        value => value.parse().unwrap_or(MISSING),
    }
}

/// Map an allele index onto its sequence: 0 is the reference, k > 0 is
/// `alt[k - 1]`. A missing index resolves to an empty string.
pub fn resolve_allele(
    reference: &[String],
    alternate: &[String],
    index: i32,
) -> Result<String, AlleleIndexError> {
    let out_of_range = || AlleleIndexError {
        index,
        ref_count: reference.len(),
        alt_count: alternate.len(),
    };

    match index {
        MISSING => Ok(String::new()),
        0 => reference.first().cloned().ok_or_else(out_of_range),
        i if i > 0 => alternate
            .get(i as usize - 1)
            .cloned()
            .ok_or_else(out_of_range),
        _ => Err(out_of_range()),
    }
}

pub fn resolve_alleles(
    reference: &[String],
    alternate: &[String],
    left: i32,
    right: i32,
) -> Result<(String, String), AlleleIndexError> {
    Ok((
        resolve_allele(reference, alternate, left)?,
        resolve_allele(reference, alternate, right)?,
    ))
}

/// Comma separated float list (`GP`, `PL`); unparseable entries become -1.
pub fn parse_float_list(raw: &str) -> Vec<f64> {
    raw.split(',')
        .map(|v| v.trim().parse::<f64>().unwrap_or(-1.0))
        .collect()
}

/// Human chromosomes 1-23, X, Y, and anything naming the mitochondrion.
pub fn is_valid_human_chromosome(value: &str) -> bool {
    match value.parse::<i64>() {
        Ok(n) if n > 0 => n < 24,
        _ => {
            let lowered = value.to_lowercase();
            lowered == "x" || lowered == "y" || lowered.contains('m')
        }
    }
}

/// Strip a leading `chr` from a chromosome name.
pub fn normalize_chromosome(value: &str) -> &str {
    value.strip_prefix("chr").unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_derive_zygosity_is_total() {
        let all = [
            Zygosity::Unknown,
            Zygosity::Reference,
            Zygosity::Alternate,
            Zygosity::Heterozygous,
            Zygosity::HomozygousReference,
            Zygosity::HomozygousAlternate,
        ];
        for left in -1..6 {
            for right in -1..6 {
                let z = derive_zygosity(left, right);
                assert!(all.contains(&z));
            }
        }
        assert_eq!(derive_zygosity(i32::MAX, i32::MIN), Zygosity::Heterozygous);
    }

    #[test]
    fn test_derive_zygosity_cases() {
        assert_eq!(derive_zygosity(MISSING, 1), Zygosity::Unknown);
        assert_eq!(derive_zygosity(0, MISSING), Zygosity::Unknown);
        assert_eq!(derive_zygosity(0, 0), Zygosity::HomozygousReference);
        assert_eq!(derive_zygosity(2, 2), Zygosity::HomozygousAlternate);
        assert_eq!(derive_zygosity(0, 1), Zygosity::Heterozygous);
        assert_eq!(derive_zygosity(1, 2), Zygosity::Heterozygous);
    }

    #[test]
    fn test_parse_genotype_field() {
        let call = parse_genotype_field("0|1");
        assert_eq!(call, GenotypeCall { left: 0, right: Some(1), phased: true });

        let call = parse_genotype_field("1/1");
        assert!(!call.phased);
        assert_eq!(call.zygosity(), Zygosity::HomozygousAlternate);

        let call = parse_genotype_field("./.");
        assert_eq!(call.left, MISSING);
        assert_eq!(call.right, Some(MISSING));
        assert_eq!(call.zygosity(), Zygosity::Unknown);

        let call = parse_genotype_field("x/1");
        assert_eq!(call.left, MISSING);

        let call = parse_genotype_field(" 1/1");
        assert_eq!(call.left, MISSING);
        assert_eq!(call.right, Some(1));
    }

    #[test]
    fn test_haploid_genotype() {
        let call = parse_genotype_field("0");
        assert_eq!(call.right, None);
        assert_eq!(call.zygosity(), Zygosity::Reference);
        assert_eq!(call.right_or_missing(), MISSING);

        assert_eq!(parse_genotype_field("2").zygosity(), Zygosity::Alternate);
        assert_eq!(parse_genotype_field(".").zygosity(), Zygosity::Unknown);
    }

    #[test]
    fn test_resolve_alleles() {
        let reference = strings(&["G"]);
        let alternate = strings(&["CT", "CTT"]);

        assert_eq!(
            resolve_alleles(&reference, &alternate, 1, 2).unwrap(),
            ("CT".to_string(), "CTT".to_string())
        );
        assert_eq!(
            resolve_alleles(&reference, &alternate, 0, 1).unwrap(),
            ("G".to_string(), "CT".to_string())
        );
        assert_eq!(
            resolve_alleles(&reference, &alternate, 0, MISSING).unwrap(),
            ("G".to_string(), String::new())
        );
    }

    #[test]
    fn test_resolve_allele_out_of_range() {
        let reference = strings(&["G"]);
        let alternate = strings(&["CT"]);

        let err = resolve_alleles(&reference, &alternate, 0, 3).unwrap_err();
        assert_eq!(err.index, 3);
        assert_eq!(err.alt_count, 1);
        assert!(resolve_allele(&reference, &alternate, -4).is_err());
        assert!(resolve_allele(&[], &alternate, 0).is_err());
    }

    #[test]
    fn test_parse_float_list() {
        assert_eq!(parse_float_list("0.1,.,3"), vec![0.1, -1.0, 3.0]);
    }

    #[test]
    fn test_human_chromosomes() {
        for chrom in ["1", "22", "23", "X", "y", "M", "MT"] {
            assert!(is_valid_human_chromosome(chrom), "{chrom}");
        }
        for chrom in ["0", "24", "-1", "Un_gl000220", "GL000192.1"] {
            assert!(!is_valid_human_chromosome(chrom), "{chrom}");
        }
        assert_eq!(normalize_chromosome("chr7"), "7");
        assert_eq!(normalize_chromosome("7"), "7");
    }
}
