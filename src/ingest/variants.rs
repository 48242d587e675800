//! VCF ingestion orchestrator.
//!
//! Each accepted file goes `Queued -> Running -> Done | Error`:
//!
//! 1. wait for a file slot (`file_concurrency`)
//! 2. copy the file into the local bridge directory
//! 3. generate its tabix index there
//! 4. upload the file, then the index, to the blob service
//! 5. remove the staged copies
//! 6. stream the BGZF source line by line, decoding up to
//!    `line_concurrency` lines at once and queueing their documents
//! 7. wait for every queued document to be answered by the store
//!
//! Line-level problems are counted and logged; anything in steps 1-5
//! fails the request.

use super::{ALREADY_RUNNING, BlobUploader, IndexGenerator, IngestOptions, acquire, io_context};
use crate::formats::vcf::{LineContext, LineOutcome, VcfHeader, transform_line};
use crate::indexing::{BulkIndexer, BulkStats, Completion, DocumentKind, Ticket};
use crate::registry::Registry;
use crate::types::{IngestResponse, State};
use crate::{Error, Result};
use noodles::bgzf;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const VCF_GZ: &str = ".vcf.gz";

#[derive(Debug, Clone)]
pub struct VariantIngestConfig {
    /// Directory requested filenames are resolved against
    pub vcf_directory: PathBuf,
    /// Local staging directory shared with the blob service
    pub bridge_directory: PathBuf,
    /// The same directory as the blob service names it
    pub remote_bridge_directory: String,
    pub file_concurrency: usize,
    pub line_concurrency: usize,
}

impl Default for VariantIngestConfig {
    fn default() -> Self {
        Self {
            vcf_directory: PathBuf::from("./data/vcfs"),
            bridge_directory: PathBuf::from("./data/bridge"),
            remote_bridge_directory: "/bridge".to_string(),
            file_concurrency: 3,
            line_concurrency: 1000,
        }
    }
}

/// Counters for one file's transformation.
#[derive(Debug, Default)]
struct LineCounters {
    lines: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    filtered_references: AtomicU64,
    documents: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub lines: u64,
    pub skipped: u64,
    pub errors: u64,
    pub filtered_references: u64,
    pub documents: u64,
}

impl From<&LineCounters> for FileSummary {
    fn from(c: &LineCounters) -> Self {
        Self {
            lines: c.lines.load(Ordering::SeqCst),
            skipped: c.skipped.load(Ordering::SeqCst),
            errors: c.errors.load(Ordering::SeqCst),
            filtered_references: c.filtered_references.load(Ordering::SeqCst),
            documents: c.documents.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Display for FileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines, {} skipped, {} errors, {} homozygous references filtered, {} documents",
            self.lines, self.skipped, self.errors, self.filtered_references, self.documents
        )
    }
}

#[derive(Clone)]
pub struct VariantIngestion {
    config: Arc<VariantIngestConfig>,
    registry: Registry,
    indexer: BulkIndexer,
    uploader: Arc<dyn BlobUploader>,
    index_generator: Arc<dyn IndexGenerator>,
    files: Arc<Semaphore>,
}

impl VariantIngestion {
    pub fn new(
        config: VariantIngestConfig,
        registry: Registry,
        indexer: BulkIndexer,
        uploader: Arc<dyn BlobUploader>,
        index_generator: Arc<dyn IndexGenerator>,
    ) -> Self {
        let files = Arc::new(Semaphore::new(config.file_concurrency.max(1)));
        Self {
            config: Arc::new(config),
            registry,
            indexer,
            uploader,
            index_generator,
            files,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> BulkStats {
        self.indexer.stats(DocumentKind::Variant)
    }

    /// Drop the blob service's bridge prefix and any leading `/`.
    pub fn resolve_filename(&self, requested: &str) -> String {
        let remote = self.config.remote_bridge_directory.trim_end_matches('/');
        let stripped = if !remote.is_empty() {
            requested.strip_prefix(remote).unwrap_or(requested)
        } else {
            requested
        };
        stripped.trim_start_matches('/').to_string()
    }

    /// Accept `filenames` for ingestion and start one pipeline per accepted
    /// file. Every filename must exist under the VCF directory; otherwise
    /// nothing is started.
    pub async fn ingest(
        &self,
        filenames: &[String],
        options: IngestOptions,
    ) -> Result<Vec<IngestResponse>> {
        let mut resolved = Vec::with_capacity(filenames.len());
        for requested in filenames {
            let filename = self.resolve_filename(requested.trim());
            if filename.is_empty() {
                return Err(Error::InvalidInput("empty filename".to_string()));
            }
            let path = self.config.vcf_directory.join(&filename);
            if !fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                return Err(Error::NotFound(format!("file {} not found", filename)));
            }
            resolved.push(filename);
        }

        let mut responses = Vec::with_capacity(resolved.len());
        for filename in resolved {
            match self.registry.submit(&filename).await {
                Ok(request) => {
                    responses.push(IngestResponse::accepted(&request));
                    let this = self.clone();
                    let options = options.clone();
                    tokio::spawn(async move { this.run(request.id, filename, options).await });
                }
                Err(Error::AlreadyRunning(filename)) => {
                    debug!("{} is already being ingested", filename);
                    responses.push(IngestResponse::rejected(filename, ALREADY_RUNNING));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }

    /// Ingest every `*.vcf.gz` below `directory` (relative to the VCF directory).
    pub async fn ingest_directory(
        &self,
        directory: &str,
        options: IngestOptions,
    ) -> Result<Vec<IngestResponse>> {
        let relative = self.resolve_filename(directory);
        let root = self.config.vcf_directory.join(&relative);
        if !fs::metadata(&root).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(Error::NotFound(format!("directory {} not found", relative)));
        }

        let filenames = find_vcf_files(&self.config.vcf_directory, &root).await?;
        info!("found {} VCF files under {}", filenames.len(), root.display());
        self.ingest(&filenames, options).await
    }

    async fn run(self, id: Uuid, filename: String, options: IngestOptions) {
        let _slot = match acquire(&self.files).await {
            Ok(permit) => permit,
            Err(e) => {
                self.registry.transition(id, State::Error, e.to_string());
                return;
            }
        };

        match self.process(id, &filename, &options).await {
            Ok(summary) => {
                self.cleanup_bridge_directory(&filename).await;
                self.registry.transition(id, State::Done, summary.to_string());
            }
            Err(e) => {
                error!("ingestion of {} failed: {}", filename, e);
                self.registry.transition(id, State::Error, e.to_string());
            }
        }
    }

    async fn process(&self, id: Uuid, filename: &str, options: &IngestOptions) -> Result<FileSummary> {
        self.registry.transition(id, State::Running, "");
        info!("begin running {}", filename);

        let source = self.config.vcf_directory.join(filename);
        fs::File::open(&source)
            .await
            .map_err(|e| io_context("error opening", &source, e))?;

        let staged = self.config.bridge_directory.join(filename);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_context("error creating bridge directory", parent, e))?;
        }
        fs::copy(&source, &staged)
            .await
            .map_err(|e| io_context("error copying to bridge file", &staged, e))?;

        let index = self.index_generator.generate(&staged).await?;

        let file_id = self.uploader.upload(filename).await?;
        let index_name = format!("{}.tbi", filename);
        self.uploader.upload(&index_name).await?;

        for path in [&staged, &index] {
            fs::remove_file(path)
                .await
                .map_err(|e| io_context("error removing temporary file", path, e))?;
        }

        let context = LineContext {
            file_id,
            assembly_id: options.assembly_id,
            dataset: options.dataset.clone(),
            filter_out_homozygous_references: options.filter_out_homozygous_references,
        };

        let started = std::time::Instant::now();
        let summary = self.transform_file(&source, context).await?;
        info!(
            "ingested {} in {:.1?}: {}",
            filename,
            started.elapsed(),
            summary
        );
        Ok(summary)
    }

    /// Decode every data line of a BGZF-compressed VCF and queue its
    /// documents. Returns once the store has answered for all of them.
    pub async fn transform_file(&self, source: &Path, context: LineContext) -> Result<FileSummary> {
        let file = fs::File::open(source)
            .await
            .map_err(|e| io_context("error opening", source, e))?;
        let mut lines = bgzf::r#async::Reader::new(file).lines();

        let gate = Arc::new(Semaphore::new(self.config.line_concurrency.max(1)));
        let completion = Completion::new();
        let counters = Arc::new(LineCounters::default());
        let context = Arc::new(context);
        let mut header: Option<Arc<VcfHeader>> = None;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| io_context("error reading", source, e))?
        {
            if line.starts_with('#') {
                if VcfHeader::is_column_line(&line) {
                    header = VcfHeader::parse(&line).map(Arc::new);
                }
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            counters.lines.fetch_add(1, Ordering::SeqCst);
            let Some(header) = header.clone() else {
                counters.errors.fetch_add(1, Ordering::SeqCst);
                debug!("data line before the column header in {}", source.display());
                continue;
            };

            let permit = acquire(&gate).await?;
            let ticket = completion.ticket();
            let task = LineTask {
                indexer: self.indexer.clone(),
                completion: completion.clone(),
                counters: Arc::clone(&counters),
                context: Arc::clone(&context),
                header,
            };
            tokio::spawn(async move {
                let _permit = permit;
                task.process(&line, ticket).await;
            });
        }

        completion.wait().await;
        Ok(FileSummary::from(counters.as_ref()))
    }

    async fn cleanup_bridge_directory(&self, filename: &str) {
        let Some(parent) = Path::new(filename).parent().filter(|p| !p.as_os_str().is_empty()) else {
            return;
        };
        let directory = self.config.bridge_directory.join(parent);
        if let Err(e) = fs::remove_dir(&directory).await {
            warn!("could not remove bridge directory {}: {}", directory.display(), e);
        }
    }
}

struct LineTask {
    indexer: BulkIndexer,
    completion: Completion,
    counters: Arc<LineCounters>,
    context: Arc<LineContext>,
    header: Arc<VcfHeader>,
}

impl LineTask {
    /// `_line_ticket` keeps the file open for completion until every
    /// document of this line holds its own ticket.
    async fn process(&self, line: &str, _line_ticket: Ticket) {
        match transform_line(&self.header, line, &self.context) {
            Ok(LineOutcome::Documents {
                documents,
                filtered_references,
            }) => {
                self.counters
                    .filtered_references
                    .fetch_add(filtered_references as u64, Ordering::SeqCst);
                for document in documents {
                    let ticket = self.completion.ticket();
                    match self.indexer.enqueue(DocumentKind::Variant, &document, ticket).await {
                        Ok(()) => {
                            self.counters.documents.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            self.counters.errors.fetch_add(1, Ordering::SeqCst);
                            warn!("could not queue variant document: {}", e);
                        }
                    }
                }
            }
            Ok(LineOutcome::InvalidChromosome(chrom)) => {
                self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                debug!("skipping line on chromosome {}", chrom);
            }
            Ok(LineOutcome::NoSamples {
                filtered_references,
            }) => {
                self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                self.counters
                    .filtered_references
                    .fetch_add(filtered_references as u64, Ordering::SeqCst);
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::SeqCst);
                warn!("skipping malformed line: {}", e);
            }
        }
    }
}

/// Relative paths of `*.vcf.gz` files below `root`, sorted.
async fn find_vcf_files(base: &Path, root: &Path) -> Result<Vec<String>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(directory) = pending.pop() {
        let mut entries = fs::read_dir(&directory)
            .await
            .map_err(|e| io_context("error listing", &directory, e))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }

            let relative = path.strip_prefix(base).unwrap_or(&path);
            let name = relative.to_string_lossy();
            if name.ends_with(VCF_GZ) {
                found.push(name.into_owned());
            } else {
                debug!("skipping {}", name);
            }
        }
    }

    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_vcf_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cohort").join("batch1");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("cohort").join("a.vcf.gz"), b"").unwrap();
        std::fs::write(nested.join("b.vcf.gz"), b"").unwrap();
        std::fs::write(nested.join("b.vcf.gz.tbi"), b"").unwrap();
        std::fs::write(nested.join("notes.txt"), b"").unwrap();

        let found = find_vcf_files(dir.path(), &dir.path().join("cohort")).await.unwrap();
        assert_eq!(found, vec!["cohort/a.vcf.gz", "cohort/batch1/b.vcf.gz"]);
    }

    #[test]
    fn test_summary_message() {
        let summary = FileSummary {
            lines: 10,
            skipped: 2,
            errors: 1,
            filtered_references: 3,
            documents: 14,
        };
        assert_eq!(
            summary.to_string(),
            "10 lines, 2 skipped, 1 errors, 3 homozygous references filtered, 14 documents"
        );
    }
}
