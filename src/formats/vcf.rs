//! VCF data line to per-sample documents.

use crate::documents::{Alleles, Genotype, Info, Sample, VariantCallDocument, Variation};
use crate::genotype::{
    self, AlleleIndexError, GenotypeCall, MISSING, is_valid_human_chromosome,
    normalize_chromosome, parse_float_list, parse_genotype_field,
};
use crate::types::AssemblyId;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedField {
    Chrom,
    Pos,
    Id,
    Ref,
    Alt,
    Qual,
    Filter,
    Info,
    Format,
}

impl FixedField {
    fn from_header(name: &str) -> Option<Self> {
        let key = name.trim().replace('#', "").to_lowercase();
        match key.as_str() {
            "chrom" => Some(FixedField::Chrom),
            "pos" => Some(FixedField::Pos),
            "id" => Some(FixedField::Id),
            "ref" => Some(FixedField::Ref),
            "alt" => Some(FixedField::Alt),
            "qual" => Some(FixedField::Qual),
            "filter" => Some(FixedField::Filter),
            "info" => Some(FixedField::Info),
            "format" => Some(FixedField::Format),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Fixed(FixedField),
    Sample(String),
}

/// Column layout taken from the `#CHROM` line.
#[derive(Debug, Clone)]
pub struct VcfHeader {
    columns: Vec<Column>,
}

impl VcfHeader {
    pub fn is_column_line(line: &str) -> bool {
        line.starts_with('#')
            && line
                .split('\t')
                .next()
                .is_some_and(|first| first.trim_start_matches('#').eq_ignore_ascii_case("chrom"))
    }

    pub fn parse(line: &str) -> Option<Self> {
        if !Self::is_column_line(line) {
            return None;
        }

        let columns = line
            .split('\t')
            .map(|name| match FixedField::from_header(name) {
                Some(field) => Column::Fixed(field),
                None => Column::Sample(name.trim().to_string()),
            })
            .collect();

        Some(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn sample_ids(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter_map(|c| match c {
            Column::Sample(id) => Some(id.as_str()),
            Column::Fixed(_) => None,
        })
    }
}

/// Per-file values stamped onto every document.
#[derive(Debug, Clone)]
pub struct LineContext {
    pub file_id: String,
    pub assembly_id: AssemblyId,
    pub dataset: String,
    pub filter_out_homozygous_references: bool,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("missing {0:?} column")]
    MissingColumn(FixedField),

    #[error(transparent)]
    AlleleIndex(#[from] AlleleIndexError),
}

#[derive(Debug)]
pub enum LineOutcome {
    Documents {
        documents: Vec<VariantCallDocument>,
        filtered_references: usize,
    },
    /// The chromosome is not a human chromosome; nothing was decoded.
    InvalidChromosome(String),
    /// Every sample was filtered out, or the line has none.
    NoSamples { filtered_references: usize },
}

#[derive(Default)]
struct FixedValues<'a> {
    chrom: Option<&'a str>,
    pos: Option<&'a str>,
    id: Option<&'a str>,
    reference: Option<&'a str>,
    alt: Option<&'a str>,
    qual: Option<&'a str>,
    filter: Option<&'a str>,
    info: Option<&'a str>,
    format: Option<&'a str>,
}

impl<'a> FixedValues<'a> {
    fn set(&mut self, field: FixedField, value: &'a str) {
        let slot = match field {
            FixedField::Chrom => &mut self.chrom,
            FixedField::Pos => &mut self.pos,
            FixedField::Id => &mut self.id,
            FixedField::Ref => &mut self.reference,
            FixedField::Alt => &mut self.alt,
            FixedField::Qual => &mut self.qual,
            FixedField::Filter => &mut self.filter,
            FixedField::Info => &mut self.info,
            FixedField::Format => &mut self.format,
        };
        *slot = Some(value);
    }
}

/// Slot positions of the sample sub-fields we decode.
#[derive(Debug, Default, Clone, Copy)]
struct FormatSlots {
    genotype: Option<usize>,
    probability: Option<usize>,
    likelihood: Option<usize>,
}

impl FormatSlots {
    fn from_format(format: &[String]) -> Self {
        let mut slots = Self::default();
        for (i, tag) in format.iter().enumerate() {
            match tag.as_str() {
                "GT" => slots.genotype = Some(i),
                "GP" => slots.probability = Some(i),
                "PL" => slots.likelihood = Some(i),
                _ => {}
            }
        }
        slots
    }
}

pub fn transform_line(
    header: &VcfHeader,
    line: &str,
    ctx: &LineContext,
) -> Result<LineOutcome, TransformError> {
    let mut fixed = FixedValues::default();
    let mut samples: Vec<(&str, &str)> = Vec::new();

    for (column, value) in header.columns().iter().zip(line.split('\t')) {
        let value = value.trim();
        match column {
            Column::Fixed(field) => fixed.set(*field, value),
            Column::Sample(id) => samples.push((id.as_str(), value)),
        }
    }

    let raw_chrom = fixed
        .chrom
        .ok_or(TransformError::MissingColumn(FixedField::Chrom))?;
    let chrom = normalize_chromosome(raw_chrom);
    if !is_valid_human_chromosome(chrom) {
        return Ok(LineOutcome::InvalidChromosome(raw_chrom.to_string()));
    }

    let reference = split_owned(
        fixed
            .reference
            .ok_or(TransformError::MissingColumn(FixedField::Ref))?,
        ',',
    );
    let alt = split_owned(
        fixed.alt.ok_or(TransformError::MissingColumn(FixedField::Alt))?,
        ',',
    );
    let format = fixed
        .format
        .map(|f| split_owned(f, ':'))
        .unwrap_or_default();
    let slots = FormatSlots::from_format(&format);

    let mut filtered_references = 0;
    let mut decoded = Vec::with_capacity(samples.len());
    for (sample_id, raw) in samples {
        let values: Vec<&str> = raw.split(':').collect();
        let gt = slots.genotype.and_then(|i| values.get(i).copied());

        if ctx.filter_out_homozygous_references && matches!(gt, Some("0/0") | Some("0|0")) {
            filtered_references += 1;
            continue;
        }

        let variation = decode_variation(&values, slots, &reference, &alt)?;
        decoded.push(Sample {
            id: sample_id.to_string(),
            variation,
        });
    }

    if decoded.is_empty() {
        return Ok(LineOutcome::NoSamples {
            filtered_references,
        });
    }

    let template = VariantCallDocument {
        chrom: chrom.to_string(),
        pos: parse_int_or_missing(fixed.pos),
        id: match fixed.id {
            Some(".") | None => "none".to_string(),
            Some(id) => id.to_string(),
        },
        reference,
        alt,
        format,
        qual: parse_int_or_missing(fixed.qual),
        filter: fixed.filter.unwrap_or_default().to_string(),
        info: fixed.info.map(parse_info).unwrap_or_default(),
        sample: Sample {
            id: String::new(),
            variation: Variation {
                genotype: unknown_genotype(),
                genotype_probability: Vec::new(),
                phred_scale_likelihood: Vec::new(),
                alleles: Alleles::default(),
            },
        },
        file_id: ctx.file_id.clone(),
        dataset: ctx.dataset.clone(),
        assembly_id: ctx.assembly_id,
    };

    let documents = decoded
        .into_iter()
        .map(|sample| VariantCallDocument {
            sample,
            ..template.clone()
        })
        .collect();

    Ok(LineOutcome::Documents {
        documents,
        filtered_references,
    })
}

fn decode_variation(
    values: &[&str],
    slots: FormatSlots,
    reference: &[String],
    alt: &[String],
) -> Result<Variation, AlleleIndexError> {
    let slot = |pos: Option<usize>| pos.and_then(|i| values.get(i).copied());

    let (genotype, alleles) = match slot(slots.genotype) {
        Some(gt) => {
            let call = parse_genotype_field(gt);
            let (left, right) = genotype::resolve_alleles(
                reference,
                alt,
                call.left,
                call.right_or_missing(),
            )?;
            (genotype_from_call(&call), Alleles { left, right })
        }
        None => (unknown_genotype(), Alleles::default()),
    };

    Ok(Variation {
        genotype,
        genotype_probability: slot(slots.probability)
            .map(parse_float_list)
            .unwrap_or_default(),
        phred_scale_likelihood: slot(slots.likelihood)
            .map(parse_float_list)
            .unwrap_or_default(),
        alleles,
    })
}

fn genotype_from_call(call: &GenotypeCall) -> Genotype {
    Genotype {
        phased: call.phased,
        zygosity: call.zygosity(),
        allele_left: call.left,
        allele_right: call.right_or_missing(),
    }
}

fn unknown_genotype() -> Genotype {
    Genotype {
        phased: false,
        zygosity: crate::types::Zygosity::Unknown,
        allele_left: MISSING,
        allele_right: MISSING,
    }
}

fn split_owned(value: &str, separator: char) -> Vec<String> {
    value.split(separator).map(str::to_string).collect()
}

fn parse_int_or_missing(value: Option<&str>) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(-1)
}

fn parse_info(value: &str) -> Vec<Info> {
    value
        .split(';')
        .map(|clause| match clause.split_once('=') {
            Some((id, value)) => Info {
                id: id.to_string(),
                value: value.to_string(),
            },
            None => Info {
                id: String::new(),
                value: clause.to_string(),
            },
        })
        .collect()
}
