//! Document batching into the store and per-file completion tracking.

pub mod bulk;
pub mod completion;

pub use bulk::{BulkConfig, BulkIndexer, BulkStats, DocumentKind};
pub use completion::{Completion, Ticket};
