//! The vector-store collaborator seam.

use crate::vector::models::{IndexDocument, ScoredDocument, SearchRequest};
use async_trait::async_trait;

/// Storage and similarity search over embedded metadata documents.
///
/// Embedding is internal to the implementation: callers hand over text plus
/// metadata and query with text. The production implementation is
/// [`super::LanceStore`]; the indexing pipeline and retriever depend only on
/// this trait.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Remove every document from the collection.
    async fn clear(&self) -> crate::Result<()>;

    /// Embed and persist a batch of documents.
    async fn add(&self, documents: Vec<IndexDocument>) -> crate::Result<()>;

    /// Similarity search, most-similar first.
    async fn search(&self, request: SearchRequest) -> crate::Result<Vec<ScoredDocument>>;
}
