use std::collections::BTreeMap;
use std::time::Duration;

use bq_store::models::{DatasetSummary, QueryResult, TableSchema, TableSummary};
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::auth::{Credentials, TokenProvider};
use crate::config::WarehouseConfig;

use super::decode::{RestRow, RestSchema, decode_rows, fields_from_rest};
use super::{Warehouse, WarehouseError, WarehouseResult};

const PAGE_SIZE: u32 = 1000;
const MAX_POLL_WAIT: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(15);

/// Warehouse client backed by the BigQuery v2 REST API.
pub struct BigQueryRestClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    project: String,
    location: String,
    api_base: Url,
    query_timeout: Duration,
}

impl BigQueryRestClient {
    /// Builds a client, loading credentials from the configured source.
    ///
    /// # Errors
    /// Returns `WarehouseError` if credentials cannot be loaded or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &WarehouseConfig) -> WarehouseResult<Self> {
        let credentials = Credentials::from_source(&config.credentials)?;
        Self::new(config, credentials)
    }

    /// Builds a client with explicit credentials.
    ///
    /// # Errors
    /// Returns `WarehouseError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &WarehouseConfig, credentials: Credentials) -> WarehouseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.query_timeout + HTTP_TIMEOUT_MARGIN)
            .user_agent(concat!("bq-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            tokens: TokenProvider::new(http.clone(), credentials),
            http,
            project: config.project.clone(),
            location: config.location.clone(),
            api_base: config.api_base.clone(),
            query_timeout: config.query_timeout,
        })
    }

    fn url(&self, segments: &[&str]) -> WarehouseResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| WarehouseError::Transport(format!("invalid API base: {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> WarehouseResult<T> {
        let token = self.tokens.token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let (reason, message) = parse_error_body(&body);
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WarehouseError::NotFound(message));
        }
        Err(WarehouseError::Api {
            status: status.as_u16(),
            reason,
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> WarehouseResult<T> {
        self.send(self.http.get(url).query(query)).await
    }

    async fn collect_pages<P, T>(
        &self,
        url: Url,
        extract: impl Fn(P) -> (Vec<T>, Option<String>) + Send,
    ) -> WarehouseResult<Vec<T>>
    where
        P: DeserializeOwned,
        T: Send,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("maxResults", PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let page: P = self.get_json(url.clone(), &query).await?;
            let (batch, next) = extract(page);
            items.extend(batch);
            match next {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<String>,
        wait: Duration,
    ) -> WarehouseResult<QueryResponse> {
        let url = self.url(&["projects", &job.project_id, "queries", &job.job_id])?;
        let location = job.location.clone().unwrap_or_else(|| self.location.clone());
        let mut query = vec![
            ("location", location),
            ("timeoutMs", duration_millis(wait).to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.get_json(url, &query).await
    }
}

impl Warehouse for BigQueryRestClient {
    fn project(&self) -> &str {
        &self.project
    }

    async fn list_datasets(&self) -> WarehouseResult<Vec<DatasetSummary>> {
        let url = self.url(&["projects", &self.project, "datasets"])?;
        self.collect_pages(url, |page: DatasetList| {
            let datasets = page.datasets.into_iter().map(DatasetItem::into_summary).collect();
            (datasets, page.next_page_token)
        })
        .await
    }

    async fn list_tables(&self, dataset_id: &str) -> WarehouseResult<Vec<TableSummary>> {
        let url = self.url(&["projects", &self.project, "datasets", dataset_id, "tables"])?;
        self.collect_pages(url, |page: TableList| {
            let tables = page.tables.into_iter().map(TableItem::into_summary).collect();
            (tables, page.next_page_token)
        })
        .await
    }

    async fn get_table(&self, dataset_id: &str, table_id: &str) -> WarehouseResult<TableSchema> {
        let url = self.url(&[
            "projects",
            &self.project,
            "datasets",
            dataset_id,
            "tables",
            table_id,
        ])?;
        let table: TableResource = self.get_json(url, &[]).await?;
        Ok(table.into_schema())
    }

    async fn run_query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        let deadline = Instant::now() + self.query_timeout;
        let request_id = Uuid::new_v4().to_string();
        let url = self.url(&["projects", &self.project, "queries"])?;
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "location": self.location,
            "timeoutMs": duration_millis(self.query_timeout),
            "maxResults": PAGE_SIZE,
            "requestId": request_id,
            "formatOptions": { "useInt64Timestamp": true },
        });
        debug!(%request_id, "submitting query");
        let mut response: QueryResponse = self.send(self.http.post(url).json(&body)).await?;

        while !response.job_complete {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WarehouseError::Timeout(format!(
                    "query did not complete within {}s",
                    self.query_timeout.as_secs()
                )));
            }
            let job = response.job_reference.clone().ok_or_else(|| {
                WarehouseError::Decode("incomplete query response without job reference".to_string())
            })?;
            debug!(job_id = %job.job_id, "waiting for query job");
            response = self
                .query_results(&job, None, remaining.min(MAX_POLL_WAIT))
                .await?;
        }

        let fields = fields_from_rest(response.schema.take().unwrap_or_default());
        let job = response.job_reference.clone();
        let total_rows = response
            .total_rows
            .as_deref()
            .and_then(|value| value.parse::<u64>().ok());
        let mut rows = decode_rows(&fields, std::mem::take(&mut response.rows))
            .map_err(WarehouseError::Decode)?;

        let mut page_token = response.page_token.take();
        while let Some(token) = page_token.filter(|token| !token.is_empty()) {
            let Some(job) = job.as_ref() else {
                break;
            };
            let mut page = self.query_results(job, Some(token), MAX_POLL_WAIT).await?;
            rows.extend(
                decode_rows(&fields, std::mem::take(&mut page.rows)).map_err(WarehouseError::Decode)?,
            );
            page_token = page.page_token.take();
        }

        Ok(QueryResult {
            job_id: job.map(|job| job.job_id),
            fields,
            rows,
            total_rows,
        })
    }
}

fn parse_error_body(body: &str) -> (Option<String>, String) {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let reason = envelope
                .error
                .errors
                .into_iter()
                .find_map(|item| item.reason)
                .or(envelope.error.status);
            (reason, envelope.error.message)
        }
        Err(_) if body.trim().is_empty() => (None, "empty error response".to_string()),
        Err(_) => (None, body.trim().to_string()),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn millis_to_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetItem {
    dataset_reference: DatasetReference,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

impl DatasetItem {
    fn into_summary(self) -> DatasetSummary {
        DatasetSummary {
            project_id: self.dataset_reference.project_id,
            dataset_id: self.dataset_reference.dataset_id,
            location: self.location,
            friendly_name: self.friendly_name,
            labels: self.labels,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    project_id: String,
    dataset_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableItem {
    table_reference: TableReference,
    #[serde(default, rename = "type")]
    table_type: Option<String>,
    #[serde(default)]
    creation_time: Option<String>,
}

impl TableItem {
    fn into_summary(self) -> TableSummary {
        TableSummary {
            dataset_id: self.table_reference.dataset_id,
            table_id: self.table_reference.table_id,
            table_type: self.table_type,
            created_at: millis_to_datetime(self.creation_time.as_deref()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    dataset_id: String,
    table_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    table_reference: TableReference,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    num_rows: Option<String>,
    #[serde(default)]
    creation_time: Option<String>,
    #[serde(default)]
    schema: RestSchema,
}

impl TableResource {
    fn into_schema(self) -> TableSchema {
        TableSchema {
            dataset_id: self.table_reference.dataset_id,
            table_id: self.table_reference.table_id,
            description: self.description,
            num_rows: self.num_rows.as_deref().and_then(|value| value.parse().ok()),
            created_at: millis_to_datetime(self.creation_time.as_deref()),
            fields: fields_from_rest(self.schema),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<RestSchema>,
    #[serde(default)]
    rows: Vec<RestRow>,
    #[serde(default)]
    total_rows: Option<String>,
    #[serde(default)]
    page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_body_prefers_reason() {
        let body = r#"{"error":{"code":403,"message":"Access Denied","status":"PERMISSION_DENIED","errors":[{"reason":"accessDenied","message":"Access Denied"}]}}"#;
        let (reason, message) = parse_error_body(body);
        assert_eq!(reason.as_deref(), Some("accessDenied"));
        assert_eq!(message, "Access Denied");
    }

    #[test]
    fn parse_error_body_falls_back_to_raw_text() {
        assert_eq!(parse_error_body("  bad gateway "), (None, "bad gateway".to_string()));
        assert_eq!(parse_error_body(""), (None, "empty error response".to_string()));
    }

    #[test]
    fn table_resource_converts_metadata() {
        let table: TableResource = serde_json::from_value(json!({
            "tableReference": { "projectId": "p", "datasetId": "sales", "tableId": "orders" },
            "numRows": "12",
            "creationTime": "1700000000000",
            "schema": { "fields": [{ "name": "id", "type": "INTEGER", "mode": "REQUIRED" }] }
        }))
        .expect("table fixture");

        let schema = table.into_schema();
        assert_eq!(schema.dataset_id, "sales");
        assert_eq!(schema.num_rows, Some(12));
        assert_eq!(
            schema.created_at.map(|ts| ts.timestamp()),
            Some(1_700_000_000)
        );
        assert_eq!(schema.fields.len(), 1);
    }
}
