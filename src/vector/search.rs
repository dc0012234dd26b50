//! Read-only retrieval over the metadata index.
//!
//! Four query shapes over the same similarity index; they differ only in
//! filter expression, limit, and line format. None of them mutates the store,
//! and a query with zero hits yields an empty string rather than an error.

use crate::config::IndexingConfig;
use crate::vector::models::{MetadataFilter, SearchRequest};
use crate::vector::store::VectorStore;
use std::collections::HashSet;
use std::sync::Arc;

/// Candidate entities shortlisted for classification.
const HEADER_CANDIDATES: usize = 3;
/// Fields fetched when narrowing context to one entity.
const ENTITY_FIELD_LIMIT: usize = 15;
/// Limit for the help listing of everything indexable.
const HELP_LIMIT: usize = 20;
/// Generic query used to pull headers for the help listing.
const HELP_QUERY: &str = "catalogs and documents";

pub struct MetadataSearch {
    store: Arc<dyn VectorStore>,
    config: IndexingConfig,
}

impl MetadataSearch {
    pub fn new(store: Arc<dyn VectorStore>, config: IndexingConfig) -> Self {
        Self { store, config }
    }

    /// General relevance search under the configured top-K and similarity
    /// threshold, one formatted line per hit, most-similar first.
    pub async fn find_relevant_context(&self, query: &str) -> crate::Result<String> {
        let hits = self
            .store
            .search(SearchRequest {
                query: query.to_string(),
                limit: self.config.top_k,
                threshold: Some(self.config.similarity_threshold),
                filter: None,
            })
            .await?;

        let context = hits
            .iter()
            .map(|hit| {
                format!(
                    "Table: {}, Field: {} (Description: {})",
                    hit.document.entity, hit.document.field, hit.document.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        tracing::debug!(%context, "retrieved metadata context");
        Ok(context)
    }

    /// Stage 1 of classification: shortlist candidate entities by searching
    /// header records only.
    pub async fn find_entity_header(&self, query: &str) -> crate::Result<String> {
        let hits = self
            .store
            .search(SearchRequest {
                query: query.to_string(),
                limit: HEADER_CANDIDATES,
                threshold: None,
                filter: Some(MetadataFilter::HeadersOnly),
            })
            .await?;

        Ok(hits
            .iter()
            .map(|hit| format!("{} [ID: {}]", hit.document.content, hit.document.entity))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Stage 2 refinement: the field structure of one entity, limiting LLM
    /// context to a single table.
    pub async fn find_fields_for_entity(&self, entity_name: &str) -> crate::Result<String> {
        let hits = self
            .store
            .search(SearchRequest {
                query: entity_name.to_string(),
                limit: ENTITY_FIELD_LIMIT,
                threshold: None,
                filter: Some(MetadataFilter::Entity(entity_name.to_string())),
            })
            .await?;

        Ok(hits
            .iter()
            .map(|hit| format!("{}: {}", hit.document.field, hit.document.content))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Deduplicated listing of every indexed entity, for the help answer.
    pub async fn list_all_entities(&self) -> crate::Result<String> {
        let hits = self
            .store
            .search(SearchRequest {
                query: HELP_QUERY.to_string(),
                limit: HELP_LIMIT,
                threshold: None,
                filter: Some(MetadataFilter::HeadersOnly),
            })
            .await?;

        let mut seen = HashSet::new();
        Ok(hits
            .iter()
            .map(|hit| format!("- {}", hit.document.content))
            .filter(|line| seen.insert(line.clone()))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::models::{IndexDocument, ScoredDocument};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns canned hits and records every request it receives.
    struct StubStore {
        hits: Vec<ScoredDocument>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl StubStore {
        fn with_hits(hits: Vec<ScoredDocument>) -> Arc<Self> {
            Arc::new(Self {
                hits,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> SearchRequest {
            self.requests.lock().unwrap().last().cloned().expect("a request")
        }
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn clear(&self) -> crate::Result<()> {
            Ok(())
        }

        async fn add(&self, _documents: Vec<IndexDocument>) -> crate::Result<()> {
            Ok(())
        }

        async fn search(&self, request: SearchRequest) -> crate::Result<Vec<ScoredDocument>> {
            self.requests.lock().unwrap().push(request);
            Ok(self.hits.clone())
        }
    }

    fn hit(entity: &str, field: &str, content: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            document: IndexDocument {
                content: content.to_string(),
                entity: entity.to_string(),
                field: field.to_string(),
                data_type: "Edm.String".to_string(),
                is_header: field == "TABLE_HEADER",
            },
            score,
        }
    }

    fn search_with(store: Arc<StubStore>) -> MetadataSearch {
        MetadataSearch::new(store, IndexingConfig::default())
    }

    #[tokio::test]
    async fn relevant_context_uses_configured_limit_and_threshold() {
        let store = StubStore::with_hits(vec![hit(
            "Catalog_Items",
            "Name",
            "[FIELD] Name in table Items",
            0.9,
        )]);
        let search = search_with(store.clone());

        let context = search.find_relevant_context("item names").await.expect("search");
        assert_eq!(
            context,
            "Table: Catalog_Items, Field: Name (Description: [FIELD] Name in table Items)"
        );

        let request = store.last_request();
        assert_eq!(request.limit, 10);
        assert_eq!(request.threshold, Some(0.75));
        assert!(request.filter.is_none());
    }

    #[tokio::test]
    async fn entity_header_search_is_header_only_top_three() {
        let store = StubStore::with_hits(vec![hit(
            "Catalog_Items",
            "TABLE_HEADER",
            "[ENTITY] Catalog Items",
            0.8,
        )]);
        let search = search_with(store.clone());

        let headers = search.find_entity_header("items?").await.expect("search");
        assert_eq!(headers, "[ENTITY] Catalog Items [ID: Catalog_Items]");

        let request = store.last_request();
        assert_eq!(request.limit, 3);
        assert_eq!(request.filter, Some(MetadataFilter::HeadersOnly));
        assert!(request.threshold.is_none());
    }

    #[tokio::test]
    async fn entity_fields_are_filtered_to_that_entity() {
        let store = StubStore::with_hits(vec![hit(
            "Catalog_Items",
            "Name",
            "[FIELD] Name in table Items",
            0.7,
        )]);
        let search = search_with(store.clone());

        let fields = search
            .find_fields_for_entity("Catalog_Items")
            .await
            .expect("search");
        assert_eq!(fields, "Name: [FIELD] Name in table Items");

        let request = store.last_request();
        assert_eq!(request.limit, 15);
        assert_eq!(
            request.filter,
            Some(MetadataFilter::Entity("Catalog_Items".to_string()))
        );
    }

    #[tokio::test]
    async fn entity_listing_deduplicates_lines() {
        let store = StubStore::with_hits(vec![
            hit("Catalog_Items", "TABLE_HEADER", "[ENTITY] Catalog Items", 0.9),
            hit("Catalog_Items", "TABLE_HEADER", "[ENTITY] Catalog Items", 0.8),
            hit("Catalog_Warehouses", "TABLE_HEADER", "[ENTITY] Catalog Warehouses", 0.7),
        ]);
        let search = search_with(store.clone());

        let listing = search.list_all_entities().await.expect("search");
        assert_eq!(listing, "- [ENTITY] Catalog Items\n- [ENTITY] Catalog Warehouses");
        assert_eq!(store.last_request().limit, 20);
    }

    #[tokio::test]
    async fn zero_hits_yield_an_empty_string() {
        let store = StubStore::with_hits(Vec::new());
        let search = search_with(store);

        assert_eq!(search.find_relevant_context("anything").await.expect("search"), "");
        assert_eq!(search.find_entity_header("anything").await.expect("search"), "");
    }
}
