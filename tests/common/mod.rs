#![allow(dead_code)]

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use vardex::{
    Error, Result,
    handlers::AppState,
    indexing::{BulkConfig, BulkIndexer},
    ingest::{
        BlobUploader, GeneIngestConfig, GeneIngestion, GeneSource, IndexGenerator,
        VariantIngestConfig, VariantIngestion, tabix::tbi_path,
    },
    query::QueryService,
    registry::Registry,
    storage::{BulkItemOutcome, DocumentStore, MemoryStore, SearchResponse},
    types::{AssemblyId, IngestionRequest},
};

/// Five data lines: two two-sample calls, one on an unplaced contig,
/// one with a homozygous reference sample and one with an allele
/// index past the ALT list.
pub const SAMPLE_VCF: &str = "\
##fileformat=VCFv4.2
##contig=<ID=1>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2
1\t100\trs1\tG\tCT,CTT\t50\tPASS\tDP=10\tGT\t0/1\t1|2
chr2\t200\t.\tA\tT\t.\tPASS\t.\tGT\t0/0\t0/0
chrUn_gl000220\t300\t.\tA\tT\t.\tPASS\t.\tGT\t0/1\t0/1
X\t400\trs4\tC\tA\t30\tPASS\t.\tGT:GP\t1/1:0,0,1\t0/0:1,0,0
Y\t500\t.\tT\tG,C\t.\tPASS\t.\tGT\t3/0\t0/1
";

pub const SAMPLE_GTF: &str = "\
##description: test annotation
chr1\tHAVANA\tgene\t11869\t14409\t.\t+\t.\tgene_id \"ENSG00000223972.5\"; gene_name \"DDX11L1\"; level 2;
chr1\tHAVANA\ttranscript\t11869\t14409\t.\t+\t.\tgene_id \"ENSG00000223972.5\"; gene_name \"DDX11L1\"; level 2;
chr1\tHAVANA\tgene\t14404\t29570\t.\t-\t.\tgene_id \"ENSG00000227232.5\"; gene_name \"WASH7P\"; level 2;
chr17\tHAVANA\tgene\t43044295\t43125483\t.\t-\t.\tgene_id \"ENSG00000012048.23\"; gene_name \"BRCA1\"; level 2;
chrM\tENSEMBL\tgene\t577\t647\t.\t+\t.\tgene_id \"ENSG00000210049.1\"; gene_name \"MT-TF\"; level 3;
GL000194.1\tENSEMBL\tgene\t53594\t115055\t.\t-\t.\tgene_id \"ENSG00000277400.1\"; gene_name \"AC215217.1\"; level 3;
";

pub const GTF_NAME: &str = "test.annotation.gtf";

/// Write `content` BGZF-compressed to `path`.
pub fn write_bgzf(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = noodles::bgzf::Writer::new(std::fs::File::create(path)?);
    writer.write_all(content.as_bytes())?;
    writer.finish()?;
    Ok(())
}

/// Records every upload and answers with a deterministic id.
#[derive(Default)]
pub struct FakeUploader {
    uploads: Mutex<Vec<String>>,
    fail: bool,
    fail_file: Option<String>,
}

impl FakeUploader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Rejects only `filename`.
    pub fn failing_on(filename: &str) -> Self {
        Self {
            fail_file: Some(filename.to_string()),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobUploader for FakeUploader {
    async fn upload(&self, filename: &str) -> Result<String> {
        self.uploads.lock().unwrap().push(filename.to_string());
        if self.fail || self.fail_file.as_deref() == Some(filename) {
            return Err(Error::Upload(format!("{} rejected", filename)));
        }
        Ok(format!("drs-{}", filename))
    }
}

/// Writes an empty `<path>.tbi` instead of running tabix.
pub struct FakeTabix;

#[async_trait]
impl IndexGenerator for FakeTabix {
    async fn generate(&self, path: &Path) -> Result<PathBuf> {
        let index = tbi_path(path);
        tokio::fs::write(&index, b"").await?;
        Ok(index)
    }
}

/// Sleeps a random `0..=max` before every bulk request, then delegates.
pub struct JitterStore {
    inner: Arc<MemoryStore>,
    max: Duration,
}

#[async_trait]
impl DocumentStore for JitterStore {
    async fn bulk_index(&self, index: &str, documents: Vec<Value>) -> Result<Vec<BulkItemOutcome>> {
        let max = self.max.as_millis() as u64;
        let delay = rand::rng().random_range(0..=max);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.bulk_index(index, documents).await
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        self.inner.search(index, body).await
    }

    async fn count(&self, index: &str, body: &Value) -> Result<u64> {
        self.inner.count(index, body).await
    }

    async fn delete_by_query(&self, index: &str, body: &Value) -> Result<u64> {
        self.inner.delete_by_query(index, body).await
    }
}

pub fn test_bulk_config() -> BulkConfig {
    BulkConfig {
        queue_capacity: 64,
        flush_size: 8,
        flush_interval: Duration::from_millis(20),
    }
}

/// A full application wired to temp directories and an in-memory store.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub uploader: Arc<FakeUploader>,
    pub variants: VariantIngestion,
    pub genes: GeneIngestion,
    pub queries: QueryService,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MemoryStore::new(), Arc::new(FakeUploader::default()))
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self::build(store, Arc::new(FakeUploader::default()))
    }

    pub fn with_uploader(uploader: Arc<dyn BlobUploader>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::assemble(store.clone(), store, Arc::new(FakeUploader::default()), uploader)
    }

    /// Bulk requests take a random time up to `max` to answer.
    pub fn with_bulk_jitter(max: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::new(JitterStore {
            inner: store.clone(),
            max,
        });
        let uploader = Arc::new(FakeUploader::default());
        Self::assemble(store, shared, uploader.clone(), uploader)
    }

    fn build(store: MemoryStore, uploader: Arc<FakeUploader>) -> Self {
        let store = Arc::new(store);
        Self::assemble(store.clone(), store, uploader.clone(), uploader)
    }

    fn assemble(
        store: Arc<MemoryStore>,
        shared: Arc<dyn DocumentStore>,
        uploader: Arc<FakeUploader>,
        blob: Arc<dyn BlobUploader>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let indexer = BulkIndexer::spawn(shared.clone(), test_bulk_config());

        let variants = VariantIngestion::new(
            VariantIngestConfig {
                vcf_directory: dir.path().join("vcfs"),
                bridge_directory: dir.path().join("bridge"),
                remote_bridge_directory: "/bridge".to_string(),
                file_concurrency: 2,
                line_concurrency: 4,
            },
            Registry::spawn("variants"),
            indexer.clone(),
            blob,
            Arc::new(FakeTabix),
        );

        let genes = GeneIngestion::new(
            GeneIngestConfig {
                gtf_directory: dir.path().join("gtfs"),
                sources: vec![GeneSource::new(
                    AssemblyId::Grch38,
                    format!("http://127.0.0.1:9/genes/{}.gz", GTF_NAME),
                )],
                line_concurrency: 4,
            },
            Registry::spawn("genes"),
            indexer,
            shared.clone(),
        )
        .unwrap();

        Self {
            dir,
            store,
            uploader,
            variants,
            genes,
            queries: QueryService::new(shared),
        }
    }

    pub fn vcf_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("vcfs").join(name)
    }

    pub fn bridge_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("bridge").join(name)
    }

    pub fn write_vcf(&self, name: &str, content: &str) {
        write_bgzf(&self.vcf_path(name), content).unwrap();
    }

    pub fn write_gtf(&self, content: &str) {
        let gtfs = self.dir.path().join("gtfs");
        std::fs::create_dir_all(&gtfs).unwrap();
        std::fs::write(gtfs.join(GTF_NAME), content).unwrap();
    }

    pub fn state(&self) -> AppState {
        AppState {
            variants: self.variants.clone(),
            genes: self.genes.clone(),
            queries: self.queries.clone(),
        }
    }
}

/// Poll `registry` until request `id` reaches a terminal state.
pub async fn wait_terminal(registry: &Registry, id: Uuid) -> IngestionRequest {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let request = registry.get(id).await.unwrap().unwrap();
        if request.state.is_terminal() {
            return request;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "request {} stuck in {:?}",
            id,
            request.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
