use async_trait::async_trait;
use futures_util::{stream, TryStreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tracepoint_filter::Expr;

use crate::{Entity, EntityStream, StorageConfig, StoreError, TableCreation, TableStore};

pub(crate) const API_VERSION: &str = "2019-02-02";

// Header names are case-insensitive; lower-case so they can be used as static names.
const NEXT_PARTITION_KEY: &str = "x-ms-continuation-nextpartitionkey";
const NEXT_ROW_KEY: &str = "x-ms-continuation-nextrowkey";
const ACCEPT_JSON: &str = "application/json;odata=nometadata";

/// Characters left bare in a query component: RFC 3986 unreserved.
pub(crate) const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Table service client speaking the REST protocol, authorized by a SAS token.
#[derive(Clone)]
pub struct AzureTableStore {
    client: reqwest::Client,
    endpoint: String,
    table: String,
    sas: Option<String>,
}

#[derive(Serialize)]
struct CreateTableRequest<'a> {
    #[serde(rename = "TableName")]
    table_name: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    value: Vec<Entity>,
}

/// Continuation token handed back between pages.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Continuation {
    pub partition_key: String,
    pub row_key: Option<String>,
}

impl AzureTableStore {
    pub fn new(endpoint: impl Into<String>, table: impl Into<String>, sas: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            table: table.into(),
            sas,
        }
    }

    pub fn from_config(cfg: &StorageConfig) -> Result<Self, StoreError> {
        let endpoint = cfg
            .table_url()
            .ok_or_else(|| StoreError::Config("no table endpoint or account".into()))?;
        Ok(Self::new(endpoint, cfg.table_name.clone(), cfg.sas()))
    }

    fn query_url(&self, filter: &str, cursor: Option<&Continuation>) -> String {
        let mut params = Vec::new();
        if let Some(sas) = &self.sas {
            params.push(sas.clone());
        }
        if !filter.is_empty() {
            params.push(format!("$filter={}", encode(filter)));
        }
        if let Some(cursor) = cursor {
            params.push(format!("NextPartitionKey={}", encode(&cursor.partition_key)));
            if let Some(row_key) = &cursor.row_key {
                params.push(format!("NextRowKey={}", encode(row_key)));
            }
        }
        let mut url = format!("{}/{}()", self.endpoint, self.table);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    async fn fetch_page(
        &self,
        filter: &str,
        cursor: Option<&Continuation>,
    ) -> Result<(Vec<Entity>, Option<Continuation>), StoreError> {
        let url = self.query_url(filter, cursor);
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, ACCEPT_JSON)
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("table query: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let next = continuation(resp.headers());
        let page: QueryResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Parse(format!("table query: {e}")))?;
        debug!(
            table = %self.table,
            rows = page.value.len(),
            more = next.is_some(),
            "Fetched table page"
        );
        Ok((page.value, next))
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_COMPONENT).to_string()
}

pub(crate) fn continuation(headers: &HeaderMap) -> Option<Continuation> {
    let partition_key = headers.get(NEXT_PARTITION_KEY)?.to_str().ok()?.to_string();
    let row_key = headers
        .get(NEXT_ROW_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Some(Continuation {
        partition_key,
        row_key,
    })
}

enum Cursor {
    Start,
    Next(Continuation),
    Done,
}

#[async_trait]
impl TableStore for AzureTableStore {
    async fn create_table(&self) -> Result<TableCreation, StoreError> {
        let mut url = format!("{}/Tables", self.endpoint);
        if let Some(sas) = &self.sas {
            url.push('?');
            url.push_str(sas);
        }
        let resp = self
            .client
            .post(&url)
            .header(ACCEPT, ACCEPT_JSON)
            .header(CONTENT_TYPE, "application/json")
            .header("x-ms-version", API_VERSION)
            .header("Prefer", "return-no-content")
            .json(&CreateTableRequest {
                table_name: &self.table,
            })
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("create table: {e}")))?;

        match resp.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(TableCreation::Created),
            StatusCode::CONFLICT => Ok(TableCreation::AlreadyExists),
            status => Err(StoreError::Status {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn query_entities(&self, filter: &Expr) -> Result<EntityStream, StoreError> {
        let this = self.clone();
        let filter = filter.render();
        debug!(table = %self.table, filter = %filter, "Querying entities");

        let pages = stream::try_unfold(Cursor::Start, move |cursor| {
            let this = this.clone();
            let filter = filter.clone();
            async move {
                let cursor = match cursor {
                    Cursor::Start => None,
                    Cursor::Next(c) => Some(c),
                    Cursor::Done => return Ok::<_, StoreError>(None),
                };
                let (rows, next) = this.fetch_page(&filter, cursor.as_ref()).await?;
                let next = match next {
                    Some(c) => Cursor::Next(c),
                    None => Cursor::Done,
                };
                Ok::<_, StoreError>(Some((rows, next)))
            }
        });

        let entities = pages
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten();
        Ok(Box::pin(entities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canned::{serve, Canned};
    use reqwest::header::HeaderValue;

    #[test]
    fn query_url_encodes_filter_after_sas() {
        let store = AzureTableStore::new(
            "https://acct.table.core.windows.net",
            "Devices",
            Some("sv=2023&sig=abc%3D".into()),
        );
        let url = store.query_url("RowKey eq 'd1'", None);
        assert_eq!(
            url,
            "https://acct.table.core.windows.net/Devices()?sv=2023&sig=abc%3D&$filter=RowKey%20eq%20%27d1%27"
        );
    }

    #[test]
    fn query_url_without_filter_or_sas_is_bare() {
        let store = AzureTableStore::new("http://localhost:10002/dev", "Devices", None);
        assert_eq!(store.query_url("", None), "http://localhost:10002/dev/Devices()");
    }

    #[test]
    fn query_url_carries_continuation() {
        let store = AzureTableStore::new("http://h", "T", None);
        let cursor = Continuation {
            partition_key: "1!8!MjAyNQ--".into(),
            row_key: Some("1!4!ZDE-".into()),
        };
        let url = store.query_url("", Some(&cursor));
        assert_eq!(
            url,
            "http://h/T()?NextPartitionKey=1%218%21MjAyNQ--&NextRowKey=1%214%21ZDE-"
        );
    }

    #[test]
    fn continuation_requires_partition_header() {
        let mut headers = HeaderMap::new();
        assert!(continuation(&headers).is_none());

        headers.insert(NEXT_ROW_KEY, HeaderValue::from_static("rk"));
        assert!(continuation(&headers).is_none());

        headers.insert(NEXT_PARTITION_KEY, HeaderValue::from_static("pk"));
        assert_eq!(
            continuation(&headers),
            Some(Continuation {
                partition_key: "pk".into(),
                row_key: Some("rk".into()),
            })
        );
    }

    fn seen_lines(seen: &[crate::canned::Seen]) -> Vec<&str> {
        seen.iter().map(|r| r.line.as_str()).collect()
    }

    #[tokio::test]
    async fn query_drains_every_page_including_empty_ones() {
        let (base, seen) = serve(vec![
            Canned::new(200, r#"{"value":[{"PartitionKey":"p1","RowKey":"a"}]}"#)
                .header("x-ms-continuation-NextPartitionKey", "pk2")
                .header("x-ms-continuation-NextRowKey", "rk2"),
            Canned::new(200, r#"{"value":[]}"#).header("x-ms-continuation-NextPartitionKey", "pk3"),
            Canned::new(
                200,
                r#"{"value":[{"PartitionKey":"p3","RowKey":"c"},{"PartitionKey":"p3","RowKey":"d"}]}"#,
            ),
        ])
        .await;
        let store = AzureTableStore::new(base, "Devices", Some("sig=x".into()));

        let rows: Vec<Entity> = store
            .query_entities(&Expr::eq_str("computerName", "WS"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r["RowKey"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["a", "c", "d"]);

        let seen = seen.lock().await;
        let filter = "sig=x&$filter=computerName%20eq%20%27WS%27";
        assert_eq!(
            seen_lines(&seen),
            vec![
                format!("GET /Devices()?{filter}"),
                format!("GET /Devices()?{filter}&NextPartitionKey=pk2&NextRowKey=rk2"),
                format!("GET /Devices()?{filter}&NextPartitionKey=pk3"),
            ]
        );
    }

    #[tokio::test]
    async fn query_surfaces_service_errors() {
        let (base, _seen) = serve(vec![Canned::new(403, "AuthenticationFailed")]).await;
        let store = AzureTableStore::new(base, "Devices", None);
        let mut rows = store.query_entities(&Expr::and(Vec::new())).await.unwrap();
        match rows.try_next().await {
            Err(StoreError::Status { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "AuthenticationFailed");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_table_treats_conflict_as_existing() {
        let (base, seen) = serve(vec![
            Canned::new(201, "{}"),
            Canned::new(409, "TableAlreadyExists"),
            Canned::new(500, "boom"),
        ])
        .await;
        let store = AzureTableStore::new(base, "Devices", Some("sig=x".into()));

        assert_eq!(store.create_table().await.unwrap(), TableCreation::Created);
        assert_eq!(store.create_table().await.unwrap(), TableCreation::AlreadyExists);
        assert!(matches!(
            store.create_table().await,
            Err(StoreError::Status { status: 500, .. })
        ));

        let seen = seen.lock().await;
        assert_eq!(seen[1].line, "POST /Tables?sig=x");
        assert_eq!(seen[1].body, r#"{"TableName":"Devices"}"#);
    }
}
