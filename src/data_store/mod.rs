//! Query-execution collaborators. The converter never talks to a warehouse
//! directly; every statement goes through a [`DataStoreClient`].

pub mod databricks;
pub mod local;
pub mod postgres;
pub mod snowflake;
pub mod statement;

pub use databricks::DatabricksDataStore;
pub use local::LocalDataStore;
pub use postgres::PostgresDataStore;
pub use snowflake::SnowflakeDataStore;
pub use statement::{BoundStatement, Dialect, Param, Statement};

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use thiserror::Error;

/// Executes statements against a warehouse.
///
/// Implementations open a connection per call and release it before
/// returning, on success and on failure alike. Calls are not retried.
#[async_trait]
pub trait DataStoreClient: Send + Sync {
    /// Runs a statement that returns rows.
    async fn run_query(&self, statement: &Statement) -> Result<Vec<Row>, DataStoreError>;
    /// Runs a statement for its side effect only.
    async fn execute(&self, statement: &Statement) -> Result<(), DataStoreError>;
    /// Dialect statements are rendered in.
    fn dialect(&self) -> Dialect;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value of `column`, matched case-insensitively since warehouses differ
    /// in how they fold unquoted names.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataStoreError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Unsupported statement: {0}")]
    Unsupported(String),
}
