use super::{DataStoreClient, DataStoreError, Dialect, Row, Statement, Value};
use crate::metric_view::TableRef;
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

const MEASURE_COLUMNS: [&str; 3] = ["id", "measure", "dax"];

#[derive(Debug, Default)]
struct LocalState {
    tables: BTreeMap<TableRef, Vec<Row>>,
    views: BTreeMap<TableRef, String>,
    log: Vec<String>,
}

/// In-memory warehouse used for offline runs and tests.
///
/// It interprets [`Statement`]s directly instead of parsing SQL, but still
/// renders each one so invalid statements fail the same way they would
/// against a real warehouse.
#[derive(Debug)]
pub struct LocalDataStore {
    state: Mutex<LocalState>,
    offline: bool,
    dialect: Dialect,
}

impl Default for LocalDataStore {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            offline: false,
            dialect: Dialect::Databricks,
        }
    }
}

impl LocalDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders statements as `dialect` would, e.g. to stand in for a
    /// warehouse without metric views.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// A store whose every call fails with a connection error.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_table(self, table: &TableRef, rows: Vec<Row>) -> Self {
        self.lock().tables.insert(table.clone(), rows);
        self
    }

    pub fn rows(&self, table: &TableRef) -> Option<Vec<Row>> {
        self.lock().tables.get(table).cloned()
    }

    /// YAML body of a registered metric view.
    pub fn view(&self, view: &TableRef) -> Option<String> {
        self.lock().views.get(view).cloned()
    }

    /// SQL of every statement run so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, statement: &Statement) -> Result<Vec<Row>, DataStoreError> {
        if self.offline {
            return Err(DataStoreError::ConnectionError(
                "local data store is offline".to_string(),
            ));
        }
        let bound = statement.render(self.dialect)?;
        debug!("Local {}: {}", statement.kind(), bound.sql);

        let mut state = self.lock();
        state.log.push(bound.sql);
        match statement {
            Statement::SampleRows { table, limit } => {
                let rows = existing(&state, table)?;
                Ok(rows.iter().take(*limit as usize).cloned().collect())
            }
            Statement::CreateMeasureTable { table } => {
                state.tables.entry(table.clone()).or_default();
                Ok(Vec::new())
            }
            Statement::InsertMeasure {
                table,
                id,
                name,
                expression,
            } => {
                let rows = state
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| DataStoreError::TableNotFound(table.to_string()))?;
                rows.push(Row::new(
                    MEASURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
                    vec![
                        Value::Int((*id).into()),
                        Value::from(name.as_str()),
                        Value::from(expression.as_str()),
                    ],
                ));
                Ok(Vec::new())
            }
            Statement::SelectMeasures { table } => {
                let rows = existing(&state, table)?;
                Ok(rows
                    .iter()
                    .map(|row| {
                        let pick = |column: &str| row.get(column).cloned().unwrap_or(Value::Null);
                        Row::new(
                            vec!["measure".to_string(), "dax".to_string()],
                            vec![pick("measure"), pick("dax")],
                        )
                    })
                    .collect())
            }
            Statement::CreateMetricView { view, yaml } => {
                state.views.insert(view.clone(), yaml.clone());
                Ok(Vec::new())
            }
        }
    }
}

fn existing<'a>(state: &'a LocalState, table: &TableRef) -> Result<&'a Vec<Row>, DataStoreError> {
    state
        .tables
        .get(table)
        .ok_or_else(|| DataStoreError::TableNotFound(table.to_string()))
}

#[async_trait]
impl DataStoreClient for LocalDataStore {
    async fn run_query(&self, statement: &Statement) -> Result<Vec<Row>, DataStoreError> {
        self.apply(statement)
    }

    async fn execute(&self, statement: &Statement) -> Result<(), DataStoreError> {
        self.apply(statement).map(|_| ())
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}
