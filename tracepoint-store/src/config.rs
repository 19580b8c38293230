use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::StoreError;

pub const DEFAULT_TABLE: &str = "Devices";
pub const DEFAULT_CONTAINER: &str = "telemetry";

/// Where the telemetry lives and how to reach it. Read once at start-up.
///
/// `account` derives both service endpoints; explicit endpoints take precedence.
/// `credential` is a SAS token, with or without its leading `?`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub account: Option<String>,
    pub table_endpoint: Option<String>,
    pub blob_endpoint: Option<String>,
    pub credential: Option<String>,
    pub table_name: String,
    pub container_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account: None,
            table_endpoint: None,
            blob_endpoint: None,
            credential: None,
            table_name: DEFAULT_TABLE.into(),
            container_name: DEFAULT_CONTAINER.into(),
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("account", &self.account)
            .field("table_endpoint", &self.table_endpoint)
            .field("blob_endpoint", &self.blob_endpoint)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("table_name", &self.table_name)
            .field("container_name", &self.container_name)
            .finish()
    }
}

impl StorageConfig {
    /// YAML file named by `TRACEPOINT_CONFIG` (if any), then `TRACEPOINT_*` overrides.
    pub fn load() -> Result<Self, StoreError> {
        let mut cfg = match std::env::var("TRACEPOINT_CONFIG") {
            Ok(path) if !path.is_empty() => {
                info!("Loading storage config from {path}");
                Self::from_path(path)?
            }
            _ => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Apply environment-style overrides; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TRACEPOINT_ACCOUNT") {
            self.account = Some(v);
        }
        if let Some(v) = get("TRACEPOINT_TABLE_ENDPOINT") {
            self.table_endpoint = Some(v);
        }
        if let Some(v) = get("TRACEPOINT_BLOB_ENDPOINT") {
            self.blob_endpoint = Some(v);
        }
        if let Some(v) = get("TRACEPOINT_SAS_TOKEN") {
            debug!("Storage credential taken from environment");
            self.credential = Some(v);
        }
        if let Some(v) = get("TRACEPOINT_TABLE") {
            self.table_name = v;
        }
        if let Some(v) = get("TRACEPOINT_CONTAINER") {
            self.container_name = v;
        }
    }

    pub fn table_url(&self) -> Option<String> {
        resolve(&self.table_endpoint, &self.account, "table")
    }

    pub fn blob_url(&self) -> Option<String> {
        resolve(&self.blob_endpoint, &self.account, "blob")
    }

    /// SAS query string without the leading `?`.
    pub fn sas(&self) -> Option<String> {
        self.credential
            .as_deref()
            .map(|c| c.trim().trim_start_matches('?').to_string())
            .filter(|c| !c.is_empty())
    }
}

fn resolve(explicit: &Option<String>, account: &Option<String>, service: &str) -> Option<String> {
    explicit
        .as_deref()
        .map(|e| e.trim().trim_end_matches('/').to_string())
        .filter(|e| !e.is_empty())
        .or_else(|| {
            account
                .as_deref()
                .filter(|a| !a.trim().is_empty())
                .map(|a| format!("https://{}.{service}.core.windows.net", a.trim()))
        })
}
