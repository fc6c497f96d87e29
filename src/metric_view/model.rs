use super::MetricViewError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metric view YAML version emitted in every document.
pub const METRIC_VIEW_VERSION: f64 = 0.1;

/// Derived grouping expression, e.g. the date dimension behind a time shift.
///
/// Equality covers every field, so two measures that shift the same
/// table/column/unit share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionDescriptor {
    pub name: String,
    pub expr: String,
    #[serde(skip_serializing, default)]
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub order: String,
    pub range: String,
    pub semiadditive: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureOutput {
    pub name: String,
    pub expr: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub window: Option<Vec<WindowDescriptor>>,
}

/// The artifact registered as a metric view. Field order is the key order of
/// the serialized YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDocument {
    pub version: f64,
    pub source: String,
    pub dimensions: Vec<DimensionDescriptor>,
    pub measures: Vec<MeasureOutput>,
}

impl MetricDocument {
    pub fn new(source: String) -> Self {
        Self {
            version: METRIC_VIEW_VERSION,
            source,
            dimensions: Vec::new(),
            measures: Vec::new(),
        }
    }

    /// Adds a measure; a measure with the same name is replaced in place.
    pub fn push_measure(&mut self, measure: MeasureOutput) {
        match self.measures.iter_mut().find(|m| m.name == measure.name) {
            Some(existing) => *existing = measure,
            None => self.measures.push(measure),
        }
    }

    pub fn push_dimension(&mut self, dimension: DimensionDescriptor) {
        if !self.dimensions.contains(&dimension) {
            self.dimensions.push(dimension);
        }
    }

    /// Last segment of the three-part source name.
    pub fn source_table(&self) -> &str {
        self.source.rsplit('.').next().unwrap_or(&self.source)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Fully qualified `catalog.schema.table` name.
///
/// Each part must be a plain identifier so it can be spliced into SQL as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(catalog: &str, schema: &str, table: &str) -> Result<Self, MetricViewError> {
        for part in [catalog, schema, table] {
            if !is_identifier(part) {
                return Err(MetricViewError::InvalidTableReference(format!(
                    "{}.{}.{}",
                    catalog, schema, table
                )));
            }
        }
        Ok(Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Another table in the same catalog and schema.
    pub fn sibling(&self, table: &str) -> Result<Self, MetricViewError> {
        Self::new(&self.catalog, &self.schema, table)
    }

    pub fn parts(&self) -> [&str; 3] {
        [&self.catalog, &self.schema, &self.table]
    }
}

impl FromStr for TableRef {
    type Err = MetricViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('.').collect::<Vec<_>>().as_slice() {
            [catalog, schema, table] => Self::new(catalog, schema, table),
            _ => Err(MetricViewError::InvalidTableReference(s.to_string())),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
