use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod status;
pub use status::{AsrRules, ProtectionStatus};

/// A raw table entity as the storage service returns it.
pub type Entity = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed device entity: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Loosely typed metric column, passed through exactly as the agent stored it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// One telemetry observation for one device.
///
/// Deserializes from the table's wire form (`PartitionKey`, `RowKey`, system `Timestamp`)
/// and serializes to the dashboard's form (`partitionKey`, `rowKey`, ...). Columns missing
/// on the entity stay `None` and are left out of the output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Recency key. Lexicographic order is assumed to follow upload time.
    #[serde(rename(serialize = "partitionKey", deserialize = "PartitionKey"), alias = "partitionKey")]
    pub partition_key: String,
    /// Lower-cased device identifier.
    #[serde(rename(serialize = "rowKey", deserialize = "RowKey"), alias = "rowKey")]
    pub row_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_on_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// System `Timestamp` property of the table row; only used to fill `timestamp`.
    #[serde(rename(deserialize = "Timestamp"), default, skip_serializing)]
    pub service_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<Metric>,
    #[serde(rename = "ramSizeGB", default, skip_serializing_if = "Option::is_none")]
    pub ram_size_gb: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_use_space: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_using: Option<Metric>,
    #[serde(default, deserialize_with = "count", skip_serializing_if = "Option::is_none")]
    pub crashes_cnt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version_full: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_cnt: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_protection: Option<ProtectionStatus>,
    #[serde(rename = "ASRRules", default, skip_serializing_if = "Option::is_none")]
    pub asr_rules: Option<AsrRules>,
}

impl DeviceSnapshot {
    /// Project a table entity into a snapshot, rejecting rows that lack keys or carry
    /// malformed typed columns.
    pub fn from_entity(entity: Entity) -> Result<Self, SnapshotError> {
        let mut snapshot: DeviceSnapshot =
            serde_json::from_value(serde_json::Value::Object(entity))?;
        if snapshot.timestamp.is_none() {
            snapshot.timestamp = snapshot.service_timestamp.take();
        }
        Ok(snapshot)
    }
}

/// Int64 columns come back from the table service as strings.
fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("count {text:?}: {e}"))),
    }
}

/// A file in the telemetry container, as listed to the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
}
