//! Metric view document model and its assembly from converted measures.

pub mod assembler;
pub mod model;

pub use assembler::{Assembly, DocumentAssembler, SourcePolicy};
pub use model::{
    DimensionDescriptor, MeasureOutput, MetricDocument, TableRef, WindowDescriptor,
    METRIC_VIEW_VERSION,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricViewError {
    #[error("No convertible expressions found")]
    NoConvertibleMeasures,

    #[error("No source table could be inferred from the measures")]
    UnresolvedSource,

    #[error("Invalid table reference: {0}, expected catalog.schema.table")]
    InvalidTableReference(String),

    #[error("Unknown source policy: {0}, expected first-seen or per-table")]
    UnknownSourcePolicy(String),
}
