use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use thiserror::Error;

use tracepoint_filter::Expr;
pub use tracepoint_types::{Entity, FileEntry};

pub mod config;
pub use config::StorageConfig;

pub mod azure_table;
pub use azure_table::AzureTableStore;

pub mod azure_blob;
pub use azure_blob::AzureBlobStore;

pub mod memory;
pub use memory::{InMemoryBlobStore, InMemoryTableStore};

#[cfg(test)]
mod canned;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage request error: {0}")]
    Request(String),
    #[error("storage returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("storage response parse error: {0}")]
    Parse(String),
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("storage misconfigured: {0}")]
    Config(String),
}

/// Lazy, finite sequence of entities. Pages are fetched as the stream is polled.
pub type EntityStream = Pin<Box<dyn Stream<Item = Result<Entity, StoreError>> + Send>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableCreation {
    Created,
    AlreadyExists,
}

/// Device telemetry table.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create the table if needed. An existing table is not an error.
    async fn create_table(&self) -> Result<TableCreation, StoreError>;

    /// List every entity matching `filter`, following continuation tokens.
    async fn query_entities(&self, filter: &Expr) -> Result<EntityStream, StoreError>;
}

/// Telemetry blob container.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Virtual directories at the container root, e.g. `2025-05-12/`.
    async fn list_prefixes(&self, delimiter: &str) -> Result<Vec<String>, StoreError>;

    /// Every blob whose name starts with `prefix` (all blobs when `None`).
    async fn list_blobs(&self, prefix: Option<&str>) -> Result<Vec<FileEntry>, StoreError>;

    async fn get_blob(&self, name: &str) -> Result<Bytes, StoreError>;
}
