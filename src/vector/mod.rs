//! Metadata vector index: storage, indexing pipeline, and retrieval.
//!
//! Field records extracted from the backend schema are embedded into a
//! LanceDB table and queried under exact-match metadata filters. Built on
//! `fastembed` embeddings and `lancedb` storage.

pub mod embedding;
pub mod indexer;
pub mod models;
pub mod search;
pub mod store;
pub mod table;

pub use embedding::EmbeddingModel;
pub use indexer::{IndexStats, MetadataIndexer, RebuildOutcome};
pub use models::{IndexDocument, MetadataFilter, ScoredDocument, SearchRequest};
pub use search::MetadataSearch;
pub use store::VectorStore;
pub use table::{LanceStore, MetadataTable};
