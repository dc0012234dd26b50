//! OData backend collaborator: HTTP client and schema extraction.

pub mod client;
pub mod schema;

pub use client::ODataClient;
pub use schema::SchemaExtractor;
