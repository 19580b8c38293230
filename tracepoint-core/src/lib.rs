use std::sync::Arc;

use futures_util::TryStreamExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use tracepoint_filter::Expr;
use tracepoint_store::{
    AzureBlobStore, AzureTableStore, BlobStore, InMemoryBlobStore, InMemoryTableStore,
    StorageConfig, StoreError, TableCreation, TableStore,
};
use tracepoint_types::{DeviceSnapshot, FileEntry, SnapshotError};

pub mod query;
pub use query::{device_log_filter, parse_instant, DeviceQuery};

pub mod reducer;
pub use reducer::{latest_by_device, LatestStatus};

pub mod scan;
pub use scan::{scan_blobs, ScanQuery};

/// Delimiter for virtual directories in the telemetry container.
pub const DIRECTORY_DELIMITER: &str = "/";

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Missing '{0}' query parameter")]
    MissingParameter(&'static str),

    #[error("Invalid '{param}' value: {value:?}")]
    InvalidDate { param: &'static str, value: String },

    #[error("blob {name} is not valid JSON: {reason}")]
    InvalidDocument { name: String, reason: String },
}

/// Read-only gateway over the telemetry table and blob container.
///
/// Every call runs its own listing to completion; nothing is cached between calls.
pub struct TelemetryService {
    table: Arc<dyn TableStore>,
    blobs: Arc<dyn BlobStore>,
}

impl TelemetryService {
    pub fn new(table: Arc<dyn TableStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { table, blobs }
    }

    /// Azure stores where an endpoint resolves, in-memory stores otherwise.
    pub fn from_config(cfg: &StorageConfig) -> Result<Self, CoreError> {
        let table: Arc<dyn TableStore> = if cfg.table_url().is_some() {
            Arc::new(AzureTableStore::from_config(cfg)?)
        } else {
            warn!("No table endpoint configured, using in-memory table store");
            Arc::new(InMemoryTableStore::new())
        };
        let blobs: Arc<dyn BlobStore> = if cfg.blob_url().is_some() {
            Arc::new(AzureBlobStore::from_config(cfg)?)
        } else {
            warn!("No blob endpoint configured, using in-memory blob store");
            Arc::new(InMemoryBlobStore::new())
        };
        Ok(Self::new(table, blobs))
    }

    pub async fn ensure_table(&self) -> Result<TableCreation, CoreError> {
        let outcome = self.table.create_table().await?;
        match outcome {
            TableCreation::Created => info!("Device table created"),
            TableCreation::AlreadyExists => info!("Device table already exists"),
        }
        Ok(outcome)
    }

    /// Every snapshot matching `query`, in storage order.
    pub async fn devices(&self, query: &DeviceQuery) -> Result<Vec<DeviceSnapshot>, CoreError> {
        let filter = query.snapshot_filter()?;
        self.snapshots(&filter).await
    }

    /// One snapshot per device: the one with the greatest partition key.
    pub async fn latest_status(&self, query: &DeviceQuery) -> Result<Vec<DeviceSnapshot>, CoreError> {
        let filter = query.latest_status_filter();
        let mut rows = self.table.query_entities(&filter).await?;
        let mut latest = LatestStatus::new();
        let mut seen = 0usize;
        while let Some(entity) = rows.try_next().await? {
            latest.observe(DeviceSnapshot::from_entity(entity)?);
            seen += 1;
        }
        debug!(snapshots = seen, devices = latest.len(), "Reduced latest status");
        Ok(latest.into_vec())
    }

    /// Full history of one device. The id is matched case-insensitively.
    pub async fn device_log(&self, device_id: &str) -> Result<Vec<DeviceSnapshot>, CoreError> {
        if device_id.is_empty() {
            return Err(CoreError::MissingParameter("deviceId"));
        }
        self.snapshots(&device_log_filter(device_id)).await
    }

    async fn snapshots(&self, filter: &Expr) -> Result<Vec<DeviceSnapshot>, CoreError> {
        let mut rows = self.table.query_entities(filter).await?;
        let mut out = Vec::new();
        while let Some(entity) = rows.try_next().await? {
            out.push(DeviceSnapshot::from_entity(entity)?);
        }
        debug!(rows = out.len(), "Collected snapshots");
        Ok(out)
    }

    pub async fn directories(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.blobs.list_prefixes(DIRECTORY_DELIMITER).await?)
    }

    /// Files under `dir`, without directory placeholder entries.
    pub async fn files(&self, dir: &str) -> Result<Vec<FileEntry>, CoreError> {
        let files = self.blobs.list_blobs(Some(dir)).await?;
        Ok(files
            .into_iter()
            .filter(|f| !f.name.ends_with(DIRECTORY_DELIMITER))
            .collect())
    }

    pub async fn json_file(&self, name: &str) -> Result<Value, CoreError> {
        let body = self.blobs.get_blob(name).await?;
        serde_json::from_slice(&body).map_err(|e| CoreError::InvalidDocument {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn scan(&self, query: &ScanQuery) -> Result<Vec<Value>, CoreError> {
        scan_blobs(self.blobs.as_ref(), query).await
    }
}
