use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use tracepoint_store::BlobStore;

use crate::query::parse_instant;
use crate::CoreError;

/// Parameters of the date-range blob scan. `date_from` and `date_to` are required.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanQuery {
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub computer_name: Option<String>,
    #[serde(default)]
    pub logged_user: Option<String>,
}

/// Walk every `.json` blob whose leading path segment is a date inside
/// `[date_from, date_to]`, keep the last document seen per `deviceId`, and sort the
/// survivors by their `timestamp` field.
///
/// Unlike the table's latest-status view, "last" here means last in listing order.
/// Blobs whose body is not JSON are logged and skipped.
pub async fn scan_blobs(store: &dyn BlobStore, query: &ScanQuery) -> Result<Vec<Value>, CoreError> {
    let from = bound("dateFrom", &query.date_from)?;
    let to = bound("dateTo", &query.date_to)?;
    let device_id = present(&query.device_id);
    let computer_name = present(&query.computer_name);
    let logged_user = present(&query.logged_user);

    let mut docs: Vec<Value> = Vec::new();
    for blob in store.list_blobs(None).await? {
        if !blob.name.ends_with(".json") {
            continue;
        }
        let segment = blob.name.split('/').next().unwrap_or_default();
        let Some(blob_date) = parse_instant(segment) else {
            debug!(blob = %blob.name, "No date prefix, skipping");
            continue;
        };
        if blob_date < from || blob_date > to {
            continue;
        }
        if device_id.is_some_and(|id| !blob.name.contains(id)) {
            continue;
        }

        let body = store.get_blob(&blob.name).await?;
        let doc: Value = match serde_json::from_slice(&body) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(blob = %blob.name, error = %e, "Skipping invalid JSON blob");
                continue;
            }
        };
        if !field_contains(&doc, "computerName", computer_name)
            || !field_contains(&doc, "loggedOnUser", logged_user)
        {
            continue;
        }
        docs.push(doc);
    }

    Ok(last_per_device_by_timestamp(docs))
}

/// Last-write-wins per `deviceId` (a replaced entry keeps its first-seen slot), then a
/// stable ascending sort on `timestamp`. Unparseable timestamps sort first.
pub fn last_per_device_by_timestamp(docs: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut by_device: IndexMap<String, Value> = IndexMap::new();
    for doc in docs {
        let Some(id) = doc.get("deviceId").and_then(Value::as_str).map(str::to_string) else {
            debug!("Document without deviceId, skipping");
            continue;
        };
        by_device.insert(id, doc);
    }

    let mut out: Vec<Value> = by_device.into_values().collect();
    out.sort_by_key(|doc| doc.get("timestamp").and_then(Value::as_str).and_then(parse_instant));
    out
}

fn bound(param: &'static str, value: &Option<String>) -> Result<chrono::DateTime<chrono::Utc>, CoreError> {
    let raw = present(value).ok_or(CoreError::MissingParameter(param))?;
    parse_instant(raw).ok_or_else(|| CoreError::InvalidDate {
        param,
        value: raw.to_string(),
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn field_contains(doc: &Value, field: &str, needle: Option<&str>) -> bool {
    match needle {
        None => true,
        Some(needle) => doc
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|v| v.contains(needle)),
    }
}
