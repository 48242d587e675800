//! Text record parsers for ingested files.
//!
//! - [`vcf`] - VCF data lines fanned out into per-sample documents
//! - [`gtf`] - GTF annotation rows narrowed to gene documents

pub mod gtf;
pub mod vcf;

pub use gtf::parse_gene_row;
pub use vcf::{LineContext, LineOutcome, TransformError, VcfHeader, transform_line};
