//! Ingestion pipelines.
//!
//! - [`variants`] - VCF files: stage, index, upload, then fan out into documents
//! - [`genes`] - GTF annotation files: fetch, replace per assembly
//!
//! Both run each accepted request on a spawned task and report progress
//! through a [`crate::registry::Registry`].

pub mod genes;
pub mod tabix;
pub mod upload;
pub mod variants;

pub use genes::{GeneIngestConfig, GeneIngestion, GeneSource};
pub use tabix::{IndexGenerator, TabixCommand};
pub use upload::{BlobUploader, DrsUploader, UploadConfig};
pub use variants::{VariantIngestConfig, VariantIngestion};

use crate::types::AssemblyId;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-request settings for a variant ingestion run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOptions {
    pub assembly_id: AssemblyId,
    #[serde(default)]
    pub dataset: String,
    #[serde(default, alias = "filterOutReferences")]
    pub filter_out_homozygous_references: bool,
}

/// Message stored on a rejected duplicate submission.
pub const ALREADY_RUNNING: &str = "File already being ingested..";

pub(crate) async fn acquire(gate: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit> {
    Arc::clone(gate)
        .acquire_owned()
        .await
        .map_err(|e| Error::Internal(format!("concurrency gate closed: {}", e)))
}

/// Wrap an io error with the action and path it happened on.
pub(crate) fn io_context(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("{} {}: {}", action, path.display(), e),
    ))
}
