//! Document and query types for the metadata vector index.

use crate::odata::schema::FieldRecord;

/// The unit persisted to the vector store: the embedding input text plus the
/// metadata used later as exact-match filters. Built 1:1 from a
/// [`FieldRecord`]; immutable after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    /// Embedding input text (the record's description).
    pub content: String,
    pub entity: String,
    pub field: String,
    pub data_type: String,
    pub is_header: bool,
}

impl From<FieldRecord> for IndexDocument {
    fn from(record: FieldRecord) -> Self {
        Self {
            content: record.description,
            entity: record.entity,
            field: record.name,
            data_type: record.data_type,
            is_header: record.is_header,
        }
    }
}

/// Exact-match metadata filter applied to a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    /// Only entity header records.
    HeadersOnly,
    /// Only records of the named entity.
    Entity(String),
}

/// A similarity query against the store.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    /// Minimum similarity score; hits below it are dropped.
    pub threshold: Option<f32>,
    pub filter: Option<MetadataFilter>,
}

/// A ranked search hit.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: IndexDocument,
    /// Similarity score in [0, 1], higher is more similar.
    pub score: f32,
}
