use super::DataStoreError;
use crate::metric_view::TableRef;
use sqlparser::ast::{Ident, ObjectName, Value as SqlValue};
use std::fmt;

/// Number of rows fetched when previewing a source table.
pub const SAMPLE_ROW_LIMIT: u32 = 5;

const YAML_DELIMITER: &str = "$$";

/// The statement shapes the converter issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    SampleRows {
        table: TableRef,
        limit: u32,
    },
    CreateMeasureTable {
        table: TableRef,
    },
    InsertMeasure {
        table: TableRef,
        id: i32,
        name: String,
        expression: String,
    },
    SelectMeasures {
        table: TableRef,
    },
    CreateMetricView {
        view: TableRef,
        yaml: String,
    },
}

/// SQL flavour a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Binds values as `$n` parameters.
    Postgres,
    Snowflake,
    Databricks,
}

impl Dialect {
    fn binds_parameters(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Only Databricks Unity Catalog understands `WITH METRICS` views.
    pub fn supports_metric_views(&self) -> bool {
        matches!(self, Dialect::Databricks)
    }

    fn text_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "TEXT",
            Dialect::Snowflake | Dialect::Databricks => "STRING",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => f.write_str("Postgres"),
            Dialect::Snowflake => f.write_str("Snowflake"),
            Dialect::Databricks => f.write_str("Databricks"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int(i32),
    Text(String),
}

impl Param {
    /// Escaped SQL literal for dialects without parameter binding.
    fn to_literal(&self) -> String {
        match self {
            Param::Int(value) => SqlValue::Number(value.to_string(), false).to_string(),
            Param::Text(value) => SqlValue::SingleQuotedString(value.clone()).to_string(),
        }
    }
}

/// Rendered SQL plus the values bound to its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

struct Binder {
    dialect: Dialect,
    params: Vec<Param>,
}

impl Binder {
    fn bind(&mut self, param: Param) -> String {
        if self.dialect.binds_parameters() {
            self.params.push(param);
            format!("${}", self.params.len())
        } else {
            param.to_literal()
        }
    }
}

fn object_name(table: &TableRef) -> String {
    ObjectName(table.parts().iter().map(|part| Ident::new(*part)).collect()).to_string()
}

impl Statement {
    pub fn sample_rows(table: &TableRef) -> Self {
        Statement::SampleRows {
            table: table.clone(),
            limit: SAMPLE_ROW_LIMIT,
        }
    }

    /// Short label used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::SampleRows { .. } => "sample rows",
            Statement::CreateMeasureTable { .. } => "create measure table",
            Statement::InsertMeasure { .. } => "insert measure",
            Statement::SelectMeasures { .. } => "select measures",
            Statement::CreateMetricView { .. } => "create metric view",
        }
    }

    pub fn render(&self, dialect: Dialect) -> Result<BoundStatement, DataStoreError> {
        let mut binder = Binder {
            dialect,
            params: Vec::new(),
        };

        let sql = match self {
            Statement::SampleRows { table, limit } => {
                format!("SELECT * FROM {} LIMIT {}", object_name(table), limit)
            }
            Statement::CreateMeasureTable { table } => format!(
                "CREATE TABLE IF NOT EXISTS {} (id INT, measure {text}, dax {text})",
                object_name(table),
                text = dialect.text_type()
            ),
            Statement::InsertMeasure {
                table,
                id,
                name,
                expression,
            } => {
                let id = binder.bind(Param::Int(*id));
                let name = binder.bind(Param::Text(name.clone()));
                let expression = binder.bind(Param::Text(expression.clone()));
                format!(
                    "INSERT INTO {} (id, measure, dax) VALUES ({}, {}, {})",
                    object_name(table),
                    id,
                    name,
                    expression
                )
            }
            Statement::SelectMeasures { table } => {
                format!("SELECT measure, dax FROM {}", object_name(table))
            }
            Statement::CreateMetricView { view, yaml } => {
                if !dialect.supports_metric_views() {
                    return Err(DataStoreError::Unsupported(format!(
                        "{} has no metric views, cannot create {}",
                        dialect, view
                    )));
                }
                if yaml.contains(YAML_DELIMITER) {
                    return Err(DataStoreError::InvalidStatement(format!(
                        "metric view body for {} contains {}",
                        view, YAML_DELIMITER
                    )));
                }
                format!(
                    "CREATE OR REPLACE VIEW {}\nWITH METRICS\nLANGUAGE YAML AS {delim}\n{}\n{delim}",
                    object_name(view),
                    yaml.trim_end(),
                    delim = YAML_DELIMITER
                )
            }
        };

        Ok(BoundStatement {
            sql,
            params: binder.params,
        })
    }
}
