use super::{DataStoreClient, DataStoreError, Dialect, Row, Statement, Value};
use crate::config::SnowflakeConfig;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use snowflake_connector_rs::{
    SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig, SnowflakeRow, SnowflakeSession,
};

pub struct SnowflakeDataStore {
    client: SnowflakeClient,
}

impl SnowflakeDataStore {
    pub fn new(config: SnowflakeConfig) -> Result<Self, DataStoreError> {
        let client = SnowflakeClient::new(
            &config.user,
            SnowflakeAuthMethod::Password(config.password.clone()),
            SnowflakeClientConfig {
                account: config.account.clone(),
                warehouse: config.warehouse.clone(),
                database: config.database.clone(),
                schema: config.schema.clone(),
                role: config.role.clone(),
                timeout: config.timeout.map(Duration::from_secs),
                ..Default::default()
            },
        )
        .map_err(|e| DataStoreError::ConnectionError(e.to_string()))?;

        Ok(SnowflakeDataStore { client })
    }

    /// A fresh session per statement; it is closed when dropped.
    async fn connect(&self) -> Result<SnowflakeSession, DataStoreError> {
        self.client.create_session().await.map_err(|e| {
            DataStoreError::ConnectionError(format!("Failed to connect to Snowflake, {}", e))
        })
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<SnowflakeRow>, DataStoreError> {
        let bound = statement.render(self.dialect())?;
        debug!("Running {}: {}", statement.kind(), bound.sql);

        let session = self.connect().await?;
        session
            .query(bound.sql.as_str())
            .await
            .map_err(|e| DataStoreError::QueryError(e.to_string()))
    }
}

fn decode_row(row: &SnowflakeRow) -> Result<Row, DataStoreError> {
    let columns: Vec<String> = row.column_names().iter().map(|c| c.to_string()).collect();
    let values = columns
        .iter()
        .map(|column| {
            row.get::<Option<String>>(column)
                .map(|value| value.map(Value::String).unwrap_or(Value::Null))
                .map_err(|e| DataStoreError::QueryError(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(columns, values))
}

#[async_trait]
impl DataStoreClient for SnowflakeDataStore {
    async fn run_query(&self, statement: &Statement) -> Result<Vec<Row>, DataStoreError> {
        let rows = self.query(statement).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: &Statement) -> Result<(), DataStoreError> {
        self.query(statement).await.map(|_| ())
    }

    fn dialect(&self) -> Dialect {
        Dialect::Snowflake
    }
}
