use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::utf8_percent_encode;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::azure_table::{API_VERSION, QUERY_COMPONENT};
use crate::{BlobStore, FileEntry, StorageConfig, StoreError};

/// Blob service client for one container, authorized by a SAS token.
#[derive(Clone)]
pub struct AzureBlobStore {
    client: reqwest::Client,
    endpoint: String,
    container: String,
    sas: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    blobs: Vec<BlobXml>,
    #[serde(rename = "BlobPrefix", default)]
    prefixes: Vec<PrefixXml>,
}

#[derive(Debug, Deserialize)]
struct BlobXml {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties", default)]
    properties: BlobProperties,
}

#[derive(Debug, Default, Deserialize)]
struct BlobProperties {
    #[serde(rename = "Content-Length", default)]
    content_length: Option<u64>,
    #[serde(rename = "Last-Modified", default)]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrefixXml {
    #[serde(rename = "Name")]
    name: String,
}

/// One parsed listing page.
#[derive(Debug, Default)]
pub(crate) struct ListingPage {
    pub files: Vec<FileEntry>,
    pub prefixes: Vec<String>,
    pub next_marker: Option<String>,
}

pub(crate) fn parse_listing(xml: &str) -> Result<ListingPage, StoreError> {
    let results: EnumerationResults =
        quick_xml::de::from_str(xml).map_err(|e| StoreError::Parse(format!("blob listing: {e}")))?;

    let files = results
        .blobs
        .blobs
        .into_iter()
        .map(|b| FileEntry {
            name: b.name,
            size: b.properties.content_length.unwrap_or(0),
            last_modified: b.properties.last_modified.as_deref().map(rfc3339),
        })
        .collect();
    let prefixes = results.blobs.prefixes.into_iter().map(|p| p.name).collect();
    let next_marker = results.next_marker.filter(|m| !m.trim().is_empty());

    Ok(ListingPage {
        files,
        prefixes,
        next_marker,
    })
}

/// The service reports RFC 1123 dates; the dashboard expects RFC 3339.
/// Anything unparseable is passed through untouched.
fn rfc3339(raw: &str) -> String {
    DateTime::parse_from_rfc2822(raw)
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        })
        .unwrap_or_else(|_| raw.to_string())
}

impl AzureBlobStore {
    pub fn new(
        endpoint: impl Into<String>,
        container: impl Into<String>,
        sas: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            container: container.into(),
            sas,
        }
    }

    pub fn from_config(cfg: &StorageConfig) -> Result<Self, StoreError> {
        let endpoint = cfg
            .blob_url()
            .ok_or_else(|| StoreError::Config("no blob endpoint or account".into()))?;
        Ok(Self::new(endpoint, cfg.container_name.clone(), cfg.sas()))
    }

    fn list_url(&self, prefix: Option<&str>, delimiter: Option<&str>, marker: Option<&str>) -> String {
        let mut url = format!("{}/{}?restype=container&comp=list", self.endpoint, self.container);
        for (key, value) in [("prefix", prefix), ("delimiter", delimiter), ("marker", marker)] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                url.push_str(&format!("&{key}={}", utf8_percent_encode(value, QUERY_COMPONENT)));
            }
        }
        if let Some(sas) = &self.sas {
            url.push('&');
            url.push_str(sas);
        }
        url
    }

    fn blob_url(&self, name: &str) -> String {
        let path = name
            .split('/')
            .map(|segment| utf8_percent_encode(segment, QUERY_COMPONENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!("{}/{}/{}", self.endpoint, self.container, path);
        if let Some(sas) = &self.sas {
            url.push('?');
            url.push_str(sas);
        }
        url
    }

    /// Walk every listing page, following `NextMarker`.
    async fn list_all(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListingPage, StoreError> {
        let mut all = ListingPage::default();
        let mut marker: Option<String> = None;
        loop {
            let url = self.list_url(prefix, delimiter, marker.as_deref());
            let resp = self
                .client
                .get(&url)
                .header("x-ms-version", API_VERSION)
                .send()
                .await
                .map_err(|e| StoreError::Request(format!("blob listing: {e}")))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(StoreError::Status {
                    status: status.as_u16(),
                    message: resp.text().await.unwrap_or_default(),
                });
            }
            let body = resp
                .text()
                .await
                .map_err(|e| StoreError::Request(format!("blob listing body: {e}")))?;

            let page = parse_listing(&body)?;
            debug!(
                container = %self.container,
                files = page.files.len(),
                prefixes = page.prefixes.len(),
                "Fetched blob listing page"
            );
            all.files.extend(page.files);
            all.prefixes.extend(page.prefixes);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(all)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn list_prefixes(&self, delimiter: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.list_all(None, Some(delimiter)).await?.prefixes)
    }

    async fn list_blobs(&self, prefix: Option<&str>) -> Result<Vec<FileEntry>, StoreError> {
        Ok(self.list_all(prefix, None).await?.files)
    }

    async fn get_blob(&self, name: &str) -> Result<Bytes, StoreError> {
        let resp = self
            .client
            .get(self.blob_url(name))
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("blob download: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(name.to_string())),
            status if !status.is_success() => Err(StoreError::Status {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            }),
            _ => resp
                .bytes()
                .await
                .map_err(|e| StoreError::Request(format!("blob download body: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canned::{serve, Canned};

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="telemetry">
  <Delimiter>/</Delimiter>
  <Blobs>
    <BlobPrefix><Name>2025-05-11/</Name></BlobPrefix>
    <Blob>
      <Name>readme.json</Name>
      <Properties>
        <Last-Modified>Mon, 12 May 2025 08:30:00 GMT</Last-Modified>
        <Etag>0x8DD</Etag>
        <Content-Length>42</Content-Length>
        <Content-Type>application/json</Content-Type>
      </Properties>
    </Blob>
    <BlobPrefix><Name>2025-05-12/</Name></BlobPrefix>
  </Blobs>
  <NextMarker>2!96!MDAw</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn listing_collects_blobs_and_prefixes() {
        let page = parse_listing(LISTING).unwrap();
        assert_eq!(page.prefixes, vec!["2025-05-11/", "2025-05-12/"]);
        assert_eq!(page.files.len(), 1);
        assert_eq!(page.files[0].name, "readme.json");
        assert_eq!(page.files[0].size, 42);
        assert_eq!(
            page.files[0].last_modified.as_deref(),
            Some("2025-05-12T08:30:00.000Z")
        );
        assert_eq!(page.next_marker.as_deref(), Some("2!96!MDAw"));
    }

    #[test]
    fn empty_marker_ends_listing() {
        let xml = r#"<EnumerationResults><Blobs /><NextMarker /></EnumerationResults>"#;
        let page = parse_listing(xml).unwrap();
        assert!(page.files.is_empty());
        assert!(page.next_marker.is_none());
    }

    #[test]
    fn urls_encode_names_and_keep_slashes() {
        let store = AzureBlobStore::new("https://acct.blob.core.windows.net", "telemetry", Some("sig=x".into()));
        assert_eq!(
            store.blob_url("2025-05-12/dev one.json"),
            "https://acct.blob.core.windows.net/telemetry/2025-05-12/dev%20one.json?sig=x"
        );
        assert_eq!(
            store.list_url(Some("2025-05-12/"), None, Some("m!1")),
            "https://acct.blob.core.windows.net/telemetry?restype=container&comp=list&prefix=2025-05-12%2F&marker=m%211&sig=x"
        );
    }

    fn page(entries: &str, marker: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?><EnumerationResults ContainerName="telemetry"><Blobs>{entries}</Blobs><NextMarker>{marker}</NextMarker></EnumerationResults>"#
        )
    }

    fn blob(name: &str, size: u64) -> String {
        format!("<Blob><Name>{name}</Name><Properties><Content-Length>{size}</Content-Length></Properties></Blob>")
    }

    #[tokio::test]
    async fn flat_listing_follows_next_marker() {
        let (base, seen) = serve(vec![
            Canned::new(200, page(&blob("2025-05-12/a.json", 10), "m!1")),
            Canned::new(200, page(&blob("2025-05-12/b.json", 20), "")),
        ])
        .await;
        let store = AzureBlobStore::new(base, "telemetry", Some("sig=x".into()));

        let files = store.list_blobs(Some("2025-05-12/")).await.unwrap();
        let names: Vec<(&str, u64)> = files.iter().map(|f| (f.name.as_str(), f.size)).collect();
        assert_eq!(names, vec![("2025-05-12/a.json", 10), ("2025-05-12/b.json", 20)]);

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0].line,
            "GET /telemetry?restype=container&comp=list&prefix=2025-05-12%2F&sig=x"
        );
        assert_eq!(
            seen[1].line,
            "GET /telemetry?restype=container&comp=list&prefix=2025-05-12%2F&marker=m%211&sig=x"
        );
    }

    #[tokio::test]
    async fn hierarchical_listing_collects_prefixes_across_pages() {
        let (base, seen) = serve(vec![
            Canned::new(200, page("<BlobPrefix><Name>2025-05-11/</Name></BlobPrefix>", "next")),
            Canned::new(200, page("<BlobPrefix><Name>2025-05-12/</Name></BlobPrefix>", "")),
        ])
        .await;
        let store = AzureBlobStore::new(base, "telemetry", None);

        let dirs = store.list_prefixes("/").await.unwrap();
        assert_eq!(dirs, vec!["2025-05-11/", "2025-05-12/"]);
        let seen = seen.lock().await;
        assert_eq!(
            seen[1].line,
            "GET /telemetry?restype=container&comp=list&delimiter=%2F&marker=next"
        );
    }

    #[tokio::test]
    async fn download_maps_missing_blob_to_not_found() {
        let (base, _seen) = serve(vec![
            Canned::new(200, r#"{"deviceId":"a"}"#),
            Canned::new(404, "BlobNotFound"),
        ])
        .await;
        let store = AzureBlobStore::new(base, "telemetry", None);

        let body = store.get_blob("2025-05-12/a.json").await.unwrap();
        assert_eq!(&body[..], br#"{"deviceId":"a"}"#);
        assert!(matches!(
            store.get_blob("2025-05-12/gone.json").await,
            Err(StoreError::NotFound(name)) if name == "2025-05-12/gone.json"
        ));
    }
}
