//! Ingest module - CSV row ingestion pipeline

pub mod pipeline;
pub mod row;
pub mod value;

pub use pipeline::{BatchSummary, FileSummary, Pipeline};
pub use row::SheetRow;
pub use value::parse_parameter_value;
