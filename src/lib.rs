//! OData → LLM bridge.
//!
//! Answers natural-language questions with live data from a legacy OData/XML
//! backend. The backend's `$metadata` schema is parsed into per-field records,
//! embedded into a LanceDB vector store, and used to narrow each question to
//! one backend entity before an LLM (with a generic OData query tool) produces
//! the final answer.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod odata;
pub mod tools;
pub mod vector;

pub use config::BridgeConfig;
pub use error::{Error, Result};
