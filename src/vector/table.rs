//! LanceDB table holding the embedded metadata documents.

use crate::error::{DbError, Result};
use crate::vector::embedding::EmbeddingModel;
use crate::vector::models::{IndexDocument, MetadataFilter, ScoredDocument, SearchRequest};
use crate::vector::store::VectorStore;
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, RecordBatchIterator};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::sync::Arc;

/// Schema constants for the metadata vectors table.
const TABLE_NAME: &str = "metadata_vectors";
const EMBEDDING_DIM: i32 = 384;

/// LanceDB table for schema metadata vectors.
pub struct MetadataTable {
    table: lancedb::Table,
}

impl Clone for MetadataTable {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
        }
    }
}

impl MetadataTable {
    /// Open existing table or create a new one.
    ///
    /// If the table exists but is corrupted (e.g. process killed mid-write),
    /// it is dropped and recreated.
    pub async fn open_or_create(connection: &lancedb::Connection) -> Result<Self> {
        match connection.open_table(TABLE_NAME).execute().await {
            Ok(table) => return Ok(Self { table }),
            Err(error) => {
                tracing::debug!(%error, "failed to open metadata_vectors table, will create");
            }
        }

        match Self::create_empty_table(connection).await {
            Ok(table) => return Ok(Self { table }),
            Err(error) => {
                tracing::warn!(
                    %error,
                    "failed to create metadata_vectors table, attempting recovery from corrupted state"
                );
            }
        }

        // Both open and create failed — table data exists but is corrupted.
        if let Err(error) = connection.drop_table(TABLE_NAME, &[]).await {
            tracing::warn!(%error, "drop_table failed during recovery, proceeding anyway");
        }

        let table = Self::create_empty_table(connection).await?;
        tracing::info!("metadata_vectors table recovered — a reindex is required");

        Ok(Self { table })
    }

    async fn create_empty_table(connection: &lancedb::Connection) -> Result<lancedb::Table> {
        let schema = Self::schema();
        let batches = RecordBatchIterator::new(vec![].into_iter().map(Ok), Arc::new(schema));

        connection
            .create_table(TABLE_NAME, Box::new(batches))
            .execute()
            .await
            .map_err(|e| DbError::LanceDb(e.to_string()).into())
    }

    /// Delete every row.
    pub async fn clear(&self) -> Result<()> {
        self.table
            .delete("true")
            .await
            .map_err(|e| DbError::LanceDb(e.to_string()))?;
        Ok(())
    }

    /// Append one batch of documents with their embeddings.
    pub async fn add_documents(
        &self,
        documents: &[IndexDocument],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        if documents.len() != embeddings.len() {
            return Err(DbError::LanceDb(format!(
                "document/embedding count mismatch: {} vs {}",
                documents.len(),
                embeddings.len()
            ))
            .into());
        }
        for embedding in &embeddings {
            if embedding.len() != EMBEDDING_DIM as usize {
                return Err(DbError::LanceDb(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    EMBEDDING_DIM,
                    embedding.len()
                ))
                .into());
            }
        }

        use arrow_array::{BooleanArray, FixedSizeListArray, RecordBatch, StringArray};

        let entity_array =
            StringArray::from(documents.iter().map(|d| d.entity.as_str()).collect::<Vec<_>>());
        let field_array =
            StringArray::from(documents.iter().map(|d| d.field.as_str()).collect::<Vec<_>>());
        let type_array = StringArray::from(
            documents.iter().map(|d| d.data_type.as_str()).collect::<Vec<_>>(),
        );
        let header_array =
            BooleanArray::from(documents.iter().map(|d| d.is_header).collect::<Vec<_>>());
        let content_array =
            StringArray::from(documents.iter().map(|d| d.content.as_str()).collect::<Vec<_>>());

        let embedding_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            embeddings
                .iter()
                .map(|e| Some(e.iter().map(|v| Some(*v)).collect::<Vec<_>>())),
            EMBEDDING_DIM,
        );

        let batch = RecordBatch::try_new(
            Arc::new(Self::schema()),
            vec![
                Arc::new(entity_array) as arrow_array::ArrayRef,
                Arc::new(field_array) as arrow_array::ArrayRef,
                Arc::new(type_array) as arrow_array::ArrayRef,
                Arc::new(header_array) as arrow_array::ArrayRef,
                Arc::new(content_array) as arrow_array::ArrayRef,
                Arc::new(embedding_array) as arrow_array::ArrayRef,
            ],
        )
        .map_err(|e| DbError::LanceDb(e.to_string()))?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], Arc::new(Self::schema()));

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| DbError::LanceDb(e.to_string()))?;

        Ok(())
    }

    /// Vector similarity search with an optional SQL predicate.
    /// Returns (document, distance) pairs sorted by distance ascending.
    pub async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        predicate: Option<String>,
    ) -> Result<Vec<(IndexDocument, f32)>> {
        if query_embedding.len() != EMBEDDING_DIM as usize {
            return Err(DbError::LanceDb(format!(
                "query embedding dimension mismatch: expected {}, got {}",
                EMBEDDING_DIM,
                query_embedding.len()
            ))
            .into());
        }

        use lancedb::query::{ExecutableQuery, QueryBase};

        let mut query = self
            .table
            .query()
            .nearest_to(query_embedding)
            .map_err(|e| DbError::LanceDb(e.to_string()))?
            .limit(limit);
        if let Some(predicate) = predicate {
            query = query.only_if(predicate);
        }

        let results: Vec<arrow_array::RecordBatch> = query
            .execute()
            .await
            .map_err(|e| DbError::LanceDb(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| DbError::LanceDb(e.to_string()))?;

        let mut matches = Vec::new();
        for batch in results {
            if let (
                Some(entity_col),
                Some(field_col),
                Some(type_col),
                Some(header_col),
                Some(content_col),
                Some(dist_col),
            ) = (
                batch.column_by_name("entity"),
                batch.column_by_name("field"),
                batch.column_by_name("data_type"),
                batch.column_by_name("is_header"),
                batch.column_by_name("content"),
                batch.column_by_name("_distance"),
            ) {
                let entities: &arrow_array::StringArray = entity_col.as_string::<i32>();
                let fields: &arrow_array::StringArray = field_col.as_string::<i32>();
                let types: &arrow_array::StringArray = type_col.as_string::<i32>();
                let headers: &arrow_array::BooleanArray = header_col.as_boolean();
                let contents: &arrow_array::StringArray = content_col.as_string::<i32>();
                let dists: &arrow_array::PrimitiveArray<Float32Type> = dist_col.as_primitive();

                for i in 0..entities.len() {
                    if entities.is_valid(i) && dists.is_valid(i) {
                        matches.push((
                            IndexDocument {
                                entity: entities.value(i).to_string(),
                                field: fields.value(i).to_string(),
                                data_type: types.value(i).to_string(),
                                is_header: headers.value(i),
                                content: contents.value(i).to_string(),
                            },
                            dists.value(i),
                        ));
                    }
                }
            }
        }

        Ok(matches)
    }

    /// Count all rows in the table.
    pub async fn count(&self) -> Result<usize> {
        use lancedb::query::{ExecutableQuery, QueryBase};

        let results: Vec<arrow_array::RecordBatch> = self
            .table
            .query()
            .select(lancedb::query::Select::columns(&["entity"]))
            .execute()
            .await
            .map_err(|e| DbError::LanceDb(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| DbError::LanceDb(e.to_string()))?;

        Ok(results.iter().map(|b| b.num_rows()).sum())
    }

    /// Get the Arrow schema for the metadata vectors table.
    fn schema() -> arrow_schema::Schema {
        arrow_schema::Schema::new(vec![
            arrow_schema::Field::new("entity", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new("field", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new("data_type", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new("is_header", arrow_schema::DataType::Boolean, false),
            arrow_schema::Field::new("content", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new(
                "embedding",
                arrow_schema::DataType::FixedSizeList(
                    Arc::new(arrow_schema::Field::new(
                        "item",
                        arrow_schema::DataType::Float32,
                        true,
                    )),
                    EMBEDDING_DIM,
                ),
                false,
            ),
        ])
    }
}

/// The production [`VectorStore`]: fastembed embeddings over a
/// [`MetadataTable`]. Embeds on both the write and the query path, so callers
/// only ever exchange text and metadata.
pub struct LanceStore {
    table: MetadataTable,
    embedder: Arc<EmbeddingModel>,
}

impl LanceStore {
    pub fn new(table: MetadataTable, embedder: Arc<EmbeddingModel>) -> Self {
        Self { table, embedder }
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn clear(&self) -> Result<()> {
        self.table.clear().await
    }

    async fn add(&self, documents: Vec<IndexDocument>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(texts).await?;
        self.table.add_documents(&documents, embeddings).await
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<ScoredDocument>> {
        let embedding = self.embedder.embed_one(&request.query).await?;
        let predicate = request.filter.map(|f| filter_predicate(&f));
        let hits = self
            .table
            .vector_search(&embedding, request.limit, predicate)
            .await?;

        let mut results: Vec<ScoredDocument> = hits
            .into_iter()
            .map(|(document, distance)| ScoredDocument {
                document,
                score: distance_to_score(distance),
            })
            .collect();
        apply_threshold(&mut results, request.threshold);

        Ok(results)
    }
}

/// Drop hits scoring below the requested similarity threshold.
fn apply_threshold(results: &mut Vec<ScoredDocument>, threshold: Option<f32>) {
    if let Some(threshold) = threshold {
        results.retain(|r| r.score >= threshold);
    }
}

/// Compile a metadata filter to a LanceDB SQL predicate.
fn filter_predicate(filter: &MetadataFilter) -> String {
    match filter {
        MetadataFilter::HeadersOnly => "is_header = true".to_string(),
        MetadataFilter::Entity(name) => format!("entity = '{}'", name.replace('\'', "''")),
    }
}

fn distance_to_score(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}
