//! Metadata indexing pipeline: extract, embed, and store in capped batches.

use crate::config::IndexingConfig;
use crate::odata::schema::SchemaSource;
use crate::vector::models::IndexDocument;
use crate::vector::store::VectorStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Pause after a failed batch before moving on. Crude overload avoidance for
/// a struggling embedding service, not a backoff policy.
const BATCH_FAILURE_COOLDOWN: Duration = Duration::from_secs(2);

/// Statistics from an indexing run.
#[derive(Debug, Clone)]
pub struct IndexStats {
    /// Documents written to the store.
    pub indexed: usize,
    /// Documents lost to failed batches; missing until the next rebuild.
    pub failed: usize,
    /// Documents prepared from the schema pass.
    pub total: usize,
    /// Whether the schema pass ended early on malformed input.
    pub parse_failure: bool,
}

/// Outcome of a rebuild call.
#[derive(Debug)]
pub enum RebuildOutcome {
    Completed(IndexStats),
    /// Another rebuild was in flight; this call did nothing. Not an error —
    /// the caller must retry later if it needs the rebuild to happen.
    AlreadyRunning,
}

/// Rebuilds the metadata index from the backend schema.
///
/// At most one rebuild may be active per indexer instance at any instant;
/// concurrent calls return [`RebuildOutcome::AlreadyRunning`] immediately.
pub struct MetadataIndexer {
    store: Arc<dyn VectorStore>,
    source: Arc<dyn SchemaSource>,
    config: IndexingConfig,
    in_flight: AtomicBool,
}

impl MetadataIndexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        source: Arc<dyn SchemaSource>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Rebuild the index from scratch: clear the collection, run the schema
    /// pass, and write the documents in batches of `batch_size`.
    ///
    /// A failed batch is logged, a fixed cooldown is applied, and the run
    /// continues with the next batch; its documents stay missing until the
    /// next rebuild. A failure to clear the collection aborts the run and is
    /// surfaced to the caller.
    pub async fn rebuild_index(&self) -> crate::Result<RebuildOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            tracing::warn!("metadata rebuild already running, skipping this call");
            return Ok(RebuildOutcome::AlreadyRunning);
        }
        // Released on every exit path, including errors and cancellation.
        let _guard = InFlightGuard(&self.in_flight);

        let stats = self.run().await?;
        Ok(RebuildOutcome::Completed(stats))
    }

    async fn run(&self) -> crate::Result<IndexStats> {
        tracing::info!("clearing metadata index");
        self.store.clear().await?;

        tracing::info!("starting schema pass over backend metadata");
        let extraction = self.source.field_records().await?;
        let parse_failure = extraction.failure.is_some();
        if let Some(failure) = &extraction.failure {
            tracing::error!(%failure, "schema pass ended early, indexing partial records");
        }

        let documents: Vec<IndexDocument> =
            extraction.records.into_iter().map(Into::into).collect();
        let total = documents.len();
        tracing::info!(total, "prepared documents for vectorization");

        let batch_size = self.config.batch_size.max(1);
        let mut indexed = 0;
        let mut failed = 0;

        for (batch_index, batch) in documents.chunks(batch_size).enumerate() {
            let start = batch_index * batch_size;
            let end = start + batch.len();

            match self.store.add(batch.to_vec()).await {
                Ok(()) => {
                    indexed += batch.len();
                    tracing::info!(progress = end, total, "indexed batch");
                }
                Err(error) => {
                    failed += batch.len();
                    tracing::error!(%error, start, end, "failed to index batch, cooling down");
                    tokio::time::sleep(BATCH_FAILURE_COOLDOWN).await;
                }
            }
        }

        tracing::info!(indexed, failed, total, "metadata rebuild complete");
        Ok(IndexStats {
            indexed,
            failed,
            total,
            parse_failure,
        })
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::odata::schema::{Extraction, FieldRecord, SchemaSource, TABLE_HEADER};
    use crate::vector::models::{ScoredDocument, SearchRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn records(fields: usize) -> Vec<FieldRecord> {
        let mut records = vec![FieldRecord {
            entity: "Catalog_Items".to_string(),
            name: TABLE_HEADER.to_string(),
            data_type: "System".to_string(),
            description: "[ENTITY] Catalog Items".to_string(),
            is_header: true,
        }];
        for i in 0..fields {
            records.push(FieldRecord {
                entity: "Catalog_Items".to_string(),
                name: format!("Field{i}"),
                data_type: "Edm.String".to_string(),
                description: format!("[FIELD] Field{i} in table Items"),
                is_header: false,
            });
        }
        records
    }

    struct FixedSource {
        records: Vec<FieldRecord>,
        failure: bool,
    }

    #[async_trait]
    impl SchemaSource for FixedSource {
        async fn field_records(&self) -> crate::Result<Extraction> {
            Ok(Extraction {
                records: self.records.clone(),
                failure: self
                    .failure
                    .then(|| crate::error::OdataError::SchemaParse("truncated".to_string())),
            })
        }
    }

    /// Records every store interaction; optionally fails one add() call.
    #[derive(Default)]
    struct ScriptedStore {
        clears: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
        fail_add_call: Option<usize>,
        fail_clear: bool,
    }

    #[async_trait]
    impl VectorStore for ScriptedStore {
        async fn clear(&self) -> crate::Result<()> {
            if self.fail_clear {
                return Err(DbError::LanceDb("collection unavailable".to_string()).into());
            }
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn add(&self, documents: Vec<crate::vector::IndexDocument>) -> crate::Result<()> {
            let mut sizes = self.batch_sizes.lock().unwrap();
            let call = sizes.len();
            sizes.push(documents.len());
            if self.fail_add_call == Some(call) {
                return Err(DbError::LanceDb("embedding service down".to_string()).into());
            }
            Ok(())
        }

        async fn search(&self, _request: SearchRequest) -> crate::Result<Vec<ScoredDocument>> {
            Ok(Vec::new())
        }
    }

    /// Blocks inside clear() until released, to hold a rebuild in flight.
    struct BlockingStore {
        entered: Notify,
        release: Notify,
        clears: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for BlockingStore {
        async fn clear(&self) -> crate::Result<()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }

        async fn add(&self, _documents: Vec<crate::vector::IndexDocument>) -> crate::Result<()> {
            Ok(())
        }

        async fn search(&self, _request: SearchRequest) -> crate::Result<Vec<ScoredDocument>> {
            Ok(Vec::new())
        }
    }

    fn config(batch_size: usize) -> IndexingConfig {
        IndexingConfig {
            batch_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn concurrent_rebuild_is_skipped_without_side_effects() {
        let store = Arc::new(BlockingStore {
            entered: Notify::new(),
            release: Notify::new(),
            clears: AtomicUsize::new(0),
        });
        let source = Arc::new(FixedSource {
            records: records(1),
            failure: false,
        });
        let indexer = Arc::new(MetadataIndexer::new(store.clone(), source, config(10)));

        let first = {
            let indexer = indexer.clone();
            tokio::spawn(async move { indexer.rebuild_index().await })
        };
        store.entered.notified().await;

        // First rebuild is parked inside clear(); the second must bail out.
        let second = indexer.rebuild_index().await.expect("second call");
        assert!(matches!(second, RebuildOutcome::AlreadyRunning));
        assert_eq!(store.clears.load(Ordering::SeqCst), 1);

        store.release.notify_one();
        let first = first.await.expect("join").expect("first call");
        assert!(matches!(first, RebuildOutcome::Completed(_)));
        assert_eq!(store.clears.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batch_does_not_abort_the_run() {
        // 5 documents, batch size 2 -> writes of [2, 2, 1]; the second fails.
        let store = Arc::new(ScriptedStore {
            fail_add_call: Some(1),
            ..Default::default()
        });
        let source = Arc::new(FixedSource {
            records: records(4),
            failure: false,
        });
        let indexer = MetadataIndexer::new(store.clone(), source, config(2));

        let outcome = indexer.rebuild_index().await.expect("rebuild");
        let RebuildOutcome::Completed(stats) = outcome else {
            panic!("expected completed rebuild");
        };
        assert_eq!(*store.batch_sizes.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(stats.indexed, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.total, 5);

        // The flag was released: a follow-up rebuild runs rather than skipping.
        let again = indexer.rebuild_index().await.expect("second rebuild");
        assert!(matches!(again, RebuildOutcome::Completed(_)));
        assert_eq!(store.clears.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_failure_aborts_and_releases_the_flag() {
        let store = Arc::new(ScriptedStore {
            fail_clear: true,
            ..Default::default()
        });
        let source = Arc::new(FixedSource {
            records: records(1),
            failure: false,
        });
        let indexer = MetadataIndexer::new(store.clone(), source, config(10));

        assert!(indexer.rebuild_index().await.is_err());
        assert!(store.batch_sizes.lock().unwrap().is_empty());

        // Not stuck on AlreadyRunning: the flag was released by the guard.
        assert!(indexer.rebuild_index().await.is_err());
    }

    #[tokio::test]
    async fn partial_schema_pass_still_indexes_and_reports() {
        let store = Arc::new(ScriptedStore::default());
        let source = Arc::new(FixedSource {
            records: records(2),
            failure: true,
        });
        let indexer = MetadataIndexer::new(store.clone(), source, config(10));

        let outcome = indexer.rebuild_index().await.expect("rebuild");
        let RebuildOutcome::Completed(stats) = outcome else {
            panic!("expected completed rebuild");
        };
        assert!(stats.parse_failure);
        assert_eq!(stats.indexed, 3);
    }
}
