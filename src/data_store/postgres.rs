use super::{DataStoreClient, DataStoreError, Dialect, Param, Row, Statement, Value};
use crate::config::PostgresConfig;
use async_trait::async_trait;
use log::{debug, error, warn};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};

pub struct PostgresDataStore {
    config: PostgresConfig,
}

impl PostgresDataStore {
    pub fn new(config: PostgresConfig) -> Self {
        PostgresDataStore { config }
    }

    /// Opens a connection that lives until the returned client is dropped.
    async fn connect(&self) -> Result<Client, DataStoreError> {
        let connection_string = format!(
            "postgres://{}:{}@{}/{}",
            self.config.user, self.config.password, self.config.host, self.config.dbname
        );

        let (client, connection) = tokio_postgres::connect(&connection_string, NoTls)
            .await
            .map_err(|e| DataStoreError::ConnectionError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Postgres connection error: {}", e);
            }
        });

        Ok(client)
    }
}

fn as_sql(param: &Param) -> &(dyn ToSql + Sync) {
    match param {
        Param::Int(value) => value,
        Param::Text(value) => value,
    }
}

fn query_error(e: tokio_postgres::Error) -> DataStoreError {
    DataStoreError::QueryError(e.to_string())
}

/// Converts a result row into a [`Row`], keyed by the statement's columns.
fn decode_row(row: &tokio_postgres::Row) -> Result<Row, DataStoreError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match *column.type_() {
            Type::BOOL => row
                .try_get::<_, Option<bool>>(idx)
                .map_err(query_error)?
                .map(Value::Boolean),
            Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)
                .map_err(query_error)?
                .map(|v| Value::Int(v.into())),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(idx)
                .map_err(query_error)?
                .map(|v| Value::Int(v.into())),
            Type::INT8 => row
                .try_get::<_, Option<i64>>(idx)
                .map_err(query_error)?
                .map(Value::Int),
            Type::FLOAT4 => row
                .try_get::<_, Option<f32>>(idx)
                .map_err(query_error)?
                .map(|v| Value::Float(v.into())),
            Type::FLOAT8 => row
                .try_get::<_, Option<f64>>(idx)
                .map_err(query_error)?
                .map(Value::Float),
            Type::NUMERIC => row
                .try_get::<_, Option<rust_decimal::Decimal>>(idx)
                .map_err(query_error)?
                .map(|v| Value::String(v.to_string())),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
                .try_get::<_, Option<String>>(idx)
                .map_err(query_error)?
                .map(Value::String),
            ref other => {
                warn!("Unsupported column type {} for {}", other, column.name());
                None
            }
        };
        columns.push(column.name().to_owned());
        values.push(value.unwrap_or(Value::Null));
    }
    Ok(Row::new(columns, values))
}

#[async_trait]
impl DataStoreClient for PostgresDataStore {
    async fn run_query(&self, statement: &Statement) -> Result<Vec<Row>, DataStoreError> {
        let bound = statement.render(Dialect::Postgres)?;
        debug!("Running {}: {}", statement.kind(), bound.sql);
        let params: Vec<&(dyn ToSql + Sync)> = bound.params.iter().map(as_sql).collect();

        let client = self.connect().await?;
        let rows = client
            .query(bound.sql.as_str(), &params)
            .await
            .map_err(query_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: &Statement) -> Result<(), DataStoreError> {
        let bound = statement.render(Dialect::Postgres)?;
        debug!("Executing {}: {}", statement.kind(), bound.sql);
        let params: Vec<&(dyn ToSql + Sync)> = bound.params.iter().map(as_sql).collect();

        let client = self.connect().await?;
        let affected = client
            .execute(bound.sql.as_str(), &params)
            .await
            .map_err(query_error)?;
        debug!("{} affected {} row(s)", statement.kind(), affected);
        Ok(())
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}
