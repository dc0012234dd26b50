//! Tools exposed to the LLM.

pub mod odata_query;

pub use odata_query::OdataQueryTool;
