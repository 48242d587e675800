use crate::indexing::BulkConfig;
use crate::ingest::{GeneIngestConfig, GeneSource, UploadConfig, VariantIngestConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "vardex")]
#[command(about = "Variant ingestion and search service for VCF and GTF files")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "VARDEX_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "VARDEX_PORT", default_value = "5000")]
    pub port: u16,

    /// Enable CORS for all origins
    #[arg(long, env = "VARDEX_CORS", default_value = "true")]
    pub cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Directory holding VCF files to ingest
    #[arg(long, env = "VARDEX_VCF_DIR", default_value = "./data/vcfs")]
    pub vcf_dir: PathBuf,

    /// Working directory for GTF downloads
    #[arg(long, env = "VARDEX_GTF_DIR", default_value = "./data/gtfs")]
    pub gtf_dir: PathBuf,

    /// Local staging directory shared with the blob service
    #[arg(long, env = "VARDEX_BRIDGE_DIR", default_value = "./data/bridge")]
    pub bridge_dir: PathBuf,

    /// The bridge directory as the blob service sees it
    #[arg(long, env = "VARDEX_DRS_BRIDGE_DIR", default_value = "/bridge")]
    pub drs_bridge_dir: String,

    /// Blob (DRS) service URL
    #[arg(long, env = "VARDEX_DRS_URL", default_value = "http://localhost:6000")]
    pub drs_url: String,

    #[arg(long, env = "VARDEX_DRS_USERNAME", default_value = "")]
    pub drs_username: String,

    #[arg(long, env = "VARDEX_DRS_PASSWORD", default_value = "", hide_env_values = true)]
    pub drs_password: String,

    /// Elasticsearch URL; without it documents are kept in memory
    #[arg(long, env = "VARDEX_ES_URL")]
    pub es_url: Option<String>,

    #[arg(long, env = "VARDEX_ES_USERNAME")]
    pub es_username: Option<String>,

    #[arg(long, env = "VARDEX_ES_PASSWORD", hide_env_values = true)]
    pub es_password: Option<String>,

    /// Bulk queue capacity; also sets the flush worker count (capacity / 100)
    #[arg(long, env = "VARDEX_BULK_INDEXING_CAP", default_value = "10000")]
    pub bulk_indexing_cap: usize,

    /// Documents per bulk request
    #[arg(long, env = "VARDEX_BULK_FLUSH_SIZE", default_value = "1000")]
    pub bulk_flush_size: usize,

    /// Seconds between flushes of partial batches
    #[arg(long, env = "VARDEX_BULK_FLUSH_INTERVAL_SECS", default_value = "30")]
    pub bulk_flush_interval_secs: u64,

    /// Files ingested at once
    #[arg(long, env = "VARDEX_FILE_PROCESSING_CONCURRENCY_LEVEL", default_value = "3")]
    pub file_processing_concurrency_level: usize,

    /// Lines decoded at once within one file
    #[arg(long, env = "VARDEX_LINE_PROCESSING_CONCURRENCY_LEVEL", default_value = "1000")]
    pub line_processing_concurrency_level: usize,

    /// Delay between blob upload attempts
    #[arg(long, env = "VARDEX_UPLOAD_RETRY_DELAY_MS", default_value = "1000")]
    pub upload_retry_delay_ms: u64,

    /// tabix executable
    #[arg(long, env = "VARDEX_TABIX", default_value = "tabix")]
    pub tabix: PathBuf,
}

impl Config {
    pub fn bulk(&self) -> BulkConfig {
        BulkConfig {
            queue_capacity: self.bulk_indexing_cap.max(1),
            flush_size: self.bulk_flush_size.max(1),
            flush_interval: Duration::from_secs(self.bulk_flush_interval_secs.max(1)),
        }
    }

    pub fn variant_ingest(&self) -> VariantIngestConfig {
        VariantIngestConfig {
            vcf_directory: self.vcf_dir.clone(),
            bridge_directory: self.bridge_dir.clone(),
            remote_bridge_directory: self.drs_bridge_dir.clone(),
            file_concurrency: self.file_processing_concurrency_level,
            line_concurrency: self.line_processing_concurrency_level,
        }
    }

    pub fn gene_ingest(&self) -> GeneIngestConfig {
        GeneIngestConfig {
            gtf_directory: self.gtf_dir.clone(),
            sources: GeneSource::gencode(),
            line_concurrency: self.line_processing_concurrency_level,
        }
    }

    pub fn upload(&self) -> UploadConfig {
        UploadConfig {
            url: self.drs_url.clone(),
            username: self.drs_username.clone(),
            password: self.drs_password.clone(),
            bridge_directory: self.drs_bridge_dir.clone(),
            max_attempts: 5,
            retry_delay: Duration::from_millis(self.upload_retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["vardex"]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.bulk_indexing_cap, 10000);
        assert_eq!(config.file_processing_concurrency_level, 3);
        assert_eq!(config.line_processing_concurrency_level, 1000);
        assert!(config.es_url.is_none());
    }

    #[test]
    fn test_component_configs() {
        let config = Config::parse_from([
            "vardex",
            "--bulk-indexing-cap",
            "50",
            "--bulk-flush-interval-secs",
            "0",
            "--upload-retry-delay-ms",
            "10",
            "--drs-bridge-dir",
            "/wes/tmp",
        ]);

        let bulk = config.bulk();
        assert_eq!(bulk.queue_capacity, 50);
        assert_eq!(bulk.workers(), 1);
        assert_eq!(bulk.flush_interval, Duration::from_secs(1));

        let upload = config.upload();
        assert_eq!(upload.max_attempts, 5);
        assert_eq!(upload.retry_delay, Duration::from_millis(10));
        assert_eq!(config.variant_ingest().remote_bridge_directory, "/wes/tmp");
        assert_eq!(config.gene_ingest().sources.len(), 2);
    }
}
