pub mod config;
pub mod converter;
pub mod data_store;
pub mod dax;
pub mod metric_view;
pub mod workflow;


pub use converter::Converter;
pub use workflow::Workflow;
