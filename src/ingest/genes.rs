//! GTF gene annotation ingestion.
//!
//! One request per configured source. Gene documents are replaced per
//! assembly: everything stored for the source's assembly is deleted before
//! the new rows are queued.

use super::{ALREADY_RUNNING, acquire, io_context};
use crate::formats::gtf::parse_gene_row;
use crate::indexing::{BulkIndexer, BulkStats, Completion, DocumentKind, Ticket};
use crate::registry::Registry;
use crate::storage::{DocumentStore, GENES_INDEX};
use crate::types::{AssemblyId, IngestResponse, State};
use crate::{Error, Result};
use flate2::read::GzDecoder;
use futures::StreamExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneSource {
    pub assembly_id: AssemblyId,
    /// Location of the gzip-compressed GTF file
    pub url: String,
}

impl GeneSource {
    pub fn new(assembly_id: AssemblyId, url: impl Into<String>) -> Self {
        Self {
            assembly_id,
            url: url.into(),
        }
    }

    /// GENCODE v38 (GRCh38) and v19 (GRCh37).
    pub fn gencode() -> Vec<Self> {
        vec![
            Self::new(
                AssemblyId::Grch38,
                "http://ftp.ebi.ac.uk/pub/databases/gencode/Gencode_human/release_38/gencode.v38.annotation.gtf.gz",
            ),
            Self::new(
                AssemblyId::Grch37,
                "http://ftp.ebi.ac.uk/pub/databases/gencode/Gencode_human/release_19/gencode.v19.annotation.gtf.gz",
            ),
        ]
    }

    /// Name of the compressed download, taken from the URL's last segment.
    pub fn archive_name(&self) -> Result<String> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::InvalidInput(format!("bad gene source url {}: {}", self.url, e)))?;
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInput(format!("no file name in {}", self.url)))
    }

    /// Name of the uncompressed GTF file.
    pub fn gtf_name(&self) -> Result<String> {
        let archive = self.archive_name()?;
        Ok(archive
            .strip_suffix(".gz")
            .map(str::to_string)
            .unwrap_or(archive))
    }
}

#[derive(Debug, Clone)]
pub struct GeneIngestConfig {
    /// Working directory for downloads and decompressed files
    pub gtf_directory: PathBuf,
    pub sources: Vec<GeneSource>,
    pub line_concurrency: usize,
}

impl Default for GeneIngestConfig {
    fn default() -> Self {
        Self {
            gtf_directory: PathBuf::from("./data/gtfs"),
            sources: GeneSource::gencode(),
            line_concurrency: 1000,
        }
    }
}

#[derive(Debug, Default)]
struct RowCounters {
    rows: AtomicU64,
    genes: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

impl RowCounters {
    fn summary(&self) -> String {
        format!(
            "{} rows, {} genes, {} skipped, {} errors",
            self.rows.load(Ordering::SeqCst),
            self.genes.load(Ordering::SeqCst),
            self.skipped.load(Ordering::SeqCst),
            self.errors.load(Ordering::SeqCst),
        )
    }
}

#[derive(Clone)]
pub struct GeneIngestion {
    config: Arc<GeneIngestConfig>,
    registry: Registry,
    indexer: BulkIndexer,
    store: Arc<dyn DocumentStore>,
    client: reqwest::Client,
}

impl GeneIngestion {
    pub fn new(
        config: GeneIngestConfig,
        registry: Registry,
        indexer: BulkIndexer,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            registry,
            indexer,
            store,
            client,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> BulkStats {
        self.indexer.stats(DocumentKind::Gene)
    }

    /// Start one request per configured source.
    pub async fn ingest(&self) -> Result<Vec<IngestResponse>> {
        let mut responses = Vec::with_capacity(self.config.sources.len());

        for source in &self.config.sources {
            let filename = source.gtf_name()?;
            match self.registry.submit(&filename).await {
                Ok(request) => {
                    responses.push(IngestResponse::accepted(&request));
                    let this = self.clone();
                    let source = source.clone();
                    tokio::spawn(async move { this.run(request.id, filename, source).await });
                }
                Err(Error::AlreadyRunning(filename)) => {
                    responses.push(IngestResponse::rejected(filename, ALREADY_RUNNING));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }

    async fn run(self, id: Uuid, filename: String, source: GeneSource) {
        match self.process(id, &filename, &source).await {
            Ok((message, downloaded)) => {
                if let Some(path) = downloaded {
                    remove_soft(&path).await;
                }
                self.registry.transition(id, State::Done, message);
            }
            Err(e) => {
                error!("gene ingestion of {} failed: {}", filename, e);
                self.registry.transition(id, State::Error, e.to_string());
            }
        }
    }

    /// Returns the completion message and, when the GTF was downloaded for
    /// this run, the path to remove afterwards.
    async fn process(
        &self,
        id: Uuid,
        filename: &str,
        source: &GeneSource,
    ) -> Result<(String, Option<PathBuf>)> {
        let gtf = self.config.gtf_directory.join(filename);

        let downloaded = if fs::metadata(&gtf).await.is_ok() {
            info!("using local copy {}", gtf.display());
            None
        } else {
            self.registry.transition(id, State::Downloading, "");
            self.fetch(source, &gtf).await?;
            Some(gtf.clone())
        };

        self.registry.transition(id, State::Running, "");

        let deleted = self
            .store
            .delete_by_query(
                GENES_INDEX,
                &json!({"query": {"term": {"assemblyId.keyword": source.assembly_id.as_str()}}}),
            )
            .await?;
        info!("removed {} {} gene documents", deleted, source.assembly_id);

        let message = self.ingest_rows(&gtf, source.assembly_id).await?;
        info!("{} ingestion done: {}", source.assembly_id, message);

        Ok((message, downloaded))
    }

    /// Download the archive and decompress it to `gtf`.
    async fn fetch(&self, source: &GeneSource, gtf: &Path) -> Result<()> {
        fs::create_dir_all(&self.config.gtf_directory)
            .await
            .map_err(|e| io_context("error creating", &self.config.gtf_directory, e))?;

        let archive = self.config.gtf_directory.join(source.archive_name()?);
        info!("downloading {} to {}", source.url, archive.display());

        let response = self.client.get(&source.url).send().await?;
        if !response.status().is_success() {
            return Err(Error::NotFound(format!(
                "{} returned {}",
                source.url,
                response.status()
            )));
        }

        let mut file = fs::File::create(&archive)
            .await
            .map_err(|e| io_context("error creating", &archive, e))?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        info!("decompressing {}", archive.display());
        let (from, to) = (archive.clone(), gtf.to_path_buf());
        tokio::task::spawn_blocking(move || decompress(&from, &to))
            .await
            .map_err(|e| Error::Internal(format!("decompression task failed: {}", e)))??;

        remove_soft(&archive).await;
        Ok(())
    }

    async fn ingest_rows(&self, gtf: &Path, assembly_id: AssemblyId) -> Result<String> {
        let file = fs::File::open(gtf)
            .await
            .map_err(|e| io_context("error opening", gtf, e))?;
        let mut lines = BufReader::new(file).lines();

        let gate = Arc::new(Semaphore::new(self.config.line_concurrency.max(1)));
        let completion = Completion::new();
        let counters = Arc::new(RowCounters::default());

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| io_context("error reading", gtf, e))?
        {
            if line.starts_with('#') {
                continue;
            }
            counters.rows.fetch_add(1, Ordering::SeqCst);

            let permit = acquire(&gate).await?;
            let ticket = completion.ticket();
            let indexer = self.indexer.clone();
            let completion = completion.clone();
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                let _permit = permit;
                ingest_row(&line, assembly_id, &indexer, &completion, &counters, ticket).await;
            });
        }

        completion.wait().await;
        Ok(counters.summary())
    }
}

async fn ingest_row(
    line: &str,
    assembly_id: AssemblyId,
    indexer: &BulkIndexer,
    completion: &Completion,
    counters: &RowCounters,
    _row_ticket: Ticket,
) {
    // Not a gene feature, an unplaced contig, or no gene_name.
    let Some(gene) = parse_gene_row(line, assembly_id) else {
        counters.skipped.fetch_add(1, Ordering::SeqCst);
        return;
    };

    match indexer.enqueue(DocumentKind::Gene, &gene, completion.ticket()).await {
        Ok(()) => {
            counters.genes.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            counters.errors.fetch_add(1, Ordering::SeqCst);
            warn!("could not queue gene {}: {}", gene.name, e);
        }
    }
}

fn decompress(archive: &Path, target: &Path) -> Result<()> {
    let input = std::fs::File::open(archive).map_err(|e| io_context("error opening", archive, e))?;
    let mut decoder = GzDecoder::new(std::io::BufReader::new(input));
    let mut output =
        std::fs::File::create(target).map_err(|e| io_context("error creating", target, e))?;
    std::io::copy(&mut decoder, &mut output)
        .map_err(|e| io_context("error decompressing", archive, e))?;
    Ok(())
}

async fn remove_soft(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) => warn!("could not remove {}: {}", path.display(), e),
    }
}
