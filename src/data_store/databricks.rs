use super::{DataStoreClient, DataStoreError, Dialect, Row, Statement, Value};
use crate::config::DatabricksConfig;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

const TABLE_NOT_FOUND: &str = "TABLE_OR_VIEW_NOT_FOUND";

/// Databricks SQL warehouse reached through the statement execution API.
///
/// Each statement is one submission; long-running ones are polled until
/// they reach a terminal state.
pub struct DatabricksDataStore {
    client: Client,
    config: DatabricksConfig,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    format: &'static str,
    disposition: &'static str,
}

#[derive(Deserialize, Debug)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Deserialize, Debug)]
struct StatementStatus {
    state: String,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Deserialize, Debug)]
struct ServiceError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
struct Manifest {
    schema: ManifestSchema,
}

#[derive(Deserialize, Debug)]
struct ManifestSchema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Deserialize, Debug)]
struct ColumnInfo {
    name: String,
    #[serde(default)]
    type_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<Option<String>>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}

impl StatementResponse {
    fn is_running(&self) -> bool {
        matches!(self.status.state.as_str(), "PENDING" | "RUNNING")
    }
}

impl DatabricksDataStore {
    pub fn new(config: DatabricksConfig) -> Result<Self, DataStoreError> {
        let client = Client::builder()
            .build()
            .map_err(|e| DataStoreError::ConnectionError(e.to_string()))?;
        Ok(DatabricksDataStore { client, config })
    }

    fn statements_url(&self) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), STATEMENTS_PATH)
    }

    async fn read(response: reqwest::Response) -> Result<StatementResponse, DataStoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataStoreError::QueryError(format!(
                "Databricks returned {}: {}",
                status, body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| DataStoreError::QueryError(e.to_string()))
    }

    /// Submits `statement` and waits for it to finish.
    async fn submit(&self, statement: &Statement) -> Result<StatementResponse, DataStoreError> {
        let bound = statement.render(self.dialect())?;
        debug!("Running {}: {}", statement.kind(), bound.sql);

        let url = self.statements_url();
        let request = StatementRequest {
            warehouse_id: &self.config.warehouse_id,
            statement: &bound.sql,
            wait_timeout: format!("{}s", self.config.wait_timeout),
            on_wait_timeout: "CONTINUE",
            format: "JSON_ARRAY",
            disposition: "INLINE",
        };
        let sent = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| DataStoreError::ConnectionError(e.to_string()))?;
        let mut response = Self::read(sent).await?;

        let mut polls = 0;
        while response.is_running() {
            if polls >= self.config.max_polls {
                return Err(DataStoreError::QueryError(format!(
                    "statement {} still {} after {} polls",
                    response.statement_id, response.status.state, polls
                )));
            }
            polls += 1;
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            let sent = self
                .client
                .get(format!("{}/{}", url, response.statement_id))
                .bearer_auth(&self.config.token)
                .send()
                .await
                .map_err(|e| DataStoreError::ConnectionError(e.to_string()))?;
            response = Self::read(sent).await?;
        }

        if response.status.state == "SUCCEEDED" {
            return Ok(response);
        }
        let StatementStatus { state, error } = response.status;
        Err(failure(statement, &state, error))
    }
}

fn failure(statement: &Statement, state: &str, error: Option<ServiceError>) -> DataStoreError {
    let (code, message) = match error {
        Some(error) => (error.error_code.unwrap_or_default(), error.message),
        None => (String::new(), String::new()),
    };
    if message.contains(TABLE_NOT_FOUND) {
        return DataStoreError::TableNotFound(message);
    }
    DataStoreError::QueryError(format!(
        "{} {}: {} {}",
        statement.kind(),
        state,
        code,
        message
    ))
}

/// JSON_ARRAY results carry every value as a string; numbers and booleans
/// are restored from the column type.
fn decode_value(type_name: Option<&str>, raw: Option<String>) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    match type_name {
        Some("BYTE" | "SHORT" | "INT" | "LONG") => match raw.parse() {
            Ok(value) => Value::Int(value),
            Err(_) => Value::String(raw),
        },
        Some("FLOAT" | "DOUBLE") => match raw.parse() {
            Ok(value) => Value::Float(value),
            Err(_) => Value::String(raw),
        },
        Some("BOOLEAN") => match raw.parse() {
            Ok(value) => Value::Boolean(value),
            Err(_) => Value::String(raw),
        },
        _ => Value::String(raw),
    }
}

fn decode_rows(response: StatementResponse) -> Vec<Row> {
    let columns = response
        .manifest
        .map(|manifest| manifest.schema.columns)
        .unwrap_or_default();
    let Some(result) = response.result else {
        return Vec::new();
    };
    if result.next_chunk_internal_link.is_some() {
        warn!(
            "Statement {} has more result chunks, only the first is read",
            response.statement_id
        );
    }

    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    result
        .data_array
        .into_iter()
        .map(|values| {
            let values = values
                .into_iter()
                .zip(&columns)
                .map(|(raw, column)| decode_value(column.type_name.as_deref(), raw))
                .collect();
            Row::new(names.clone(), values)
        })
        .collect()
}

#[async_trait]
impl DataStoreClient for DatabricksDataStore {
    async fn run_query(&self, statement: &Statement) -> Result<Vec<Row>, DataStoreError> {
        self.submit(statement).await.map(decode_rows)
    }

    async fn execute(&self, statement: &Statement) -> Result<(), DataStoreError> {
        self.submit(statement).await.map(|_| ())
    }

    fn dialect(&self) -> Dialect {
        Dialect::Databricks
    }
}
