use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::Mutex;

use tracepoint_filter::Expr;

use crate::{BlobStore, Entity, EntityStream, FileEntry, StoreError, TableCreation, TableStore};

/// In-memory device table.
///
/// Evaluates filter expressions in-process and yields matches in insertion order.
/// Used for local runs without a storage account and in tests.
///
/// NOTE: not durable.
pub struct InMemoryTableStore {
    inner: Mutex<TableInner>,
}

#[derive(Default)]
struct TableInner {
    created: bool,
    rows: Vec<Entity>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
        }
    }

    pub fn with_entities(rows: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                created: true,
                rows: rows.into_iter().collect(),
            }),
        }
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn create_table(&self) -> Result<TableCreation, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.created {
            Ok(TableCreation::AlreadyExists)
        } else {
            inner.created = true;
            Ok(TableCreation::Created)
        }
    }

    async fn query_entities(&self, filter: &Expr) -> Result<EntityStream, StoreError> {
        let inner = self.inner.lock().await;
        let rows: Vec<Result<Entity, StoreError>> = inner
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(rows)))
    }
}

struct StoredBlob {
    data: Bytes,
    last_modified: Option<String>,
}

/// In-memory blob container, listed in name order like the real service.
pub struct InMemoryBlobStore {
    blobs: Mutex<BTreeMap<String, StoredBlob>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(BTreeMap::new()),
        }
    }

    pub async fn put(
        &self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        last_modified: Option<String>,
    ) {
        self.blobs.lock().await.insert(
            name.into(),
            StoredBlob {
                data: data.into(),
                last_modified,
            },
        );
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list_prefixes(&self, delimiter: &str) -> Result<Vec<String>, StoreError> {
        let blobs = self.blobs.lock().await;
        let mut prefixes: Vec<String> = Vec::new();
        for name in blobs.keys() {
            let Some(idx) = name.find(delimiter) else { continue; };
            let prefix = &name[..idx + delimiter.len()];
            if prefixes.last().map(String::as_str) != Some(prefix) {
                prefixes.push(prefix.to_string());
            }
        }
        Ok(prefixes)
    }

    async fn list_blobs(&self, prefix: Option<&str>) -> Result<Vec<FileEntry>, StoreError> {
        let blobs = self.blobs.lock().await;
        Ok(blobs
            .iter()
            .filter(|(name, _)| prefix.map_or(true, |p| name.starts_with(p)))
            .map(|(name, blob)| FileEntry {
                name: name.clone(),
                size: blob.data.len() as u64,
                last_modified: blob.last_modified.clone(),
            })
            .collect())
    }

    async fn get_blob(&self, name: &str) -> Result<Bytes, StoreError> {
        self.blobs
            .lock()
            .await
            .get(name)
            .map(|b| b.data.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
