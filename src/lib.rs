pub mod config;
pub mod documents;
pub mod error;
pub mod formats;
pub mod genotype;
pub mod handlers;
pub mod indexing;
pub mod ingest;
pub mod query;
pub mod registry;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
