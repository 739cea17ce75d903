//! LanceDB Vector Store - 디스크 영속 벡터 저장소
//!
//! 디렉토리 하나가 LanceDB 데이터베이스이고, 컬렉션 이름이 테이블 이름입니다.
//! `chunk_id` 기준 merge-insert로 upsert하며, 임베딩 차원은 첫 upsert에서 고정됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use lancedb::DistanceType;

use crate::config::DistanceMetric;
use crate::error::{Error, Result};

use super::vector::{
    prepare_batch, sort_results, ChunkMetadata, SearchResult, VectorRecord, VectorStore,
};

/// 임베딩 컬럼 이름
const EMBEDDING_COLUMN: &str = "embedding";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    metric: DistanceMetric,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기 (디렉토리가 없으면 생성)
    ///
    /// # Arguments
    /// * `dir` - 영속 디렉토리
    /// * `collection` - 컬렉션(테이블) 이름
    /// * `metric` - 검색 거리 함수
    pub async fn open(dir: &Path, collection: &str, metric: DistanceMetric) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::store(&format!("Failed to create {:?}", dir), e))?;

        let path_str = dir
            .to_str()
            .ok_or_else(|| Error::StoreUnavailable(format!("Invalid path encoding: {:?}", dir)))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(|e| Error::store("Failed to connect to LanceDB", e))?;

        tracing::debug!("LanceDB opened at {:?} (collection: {})", dir, collection);

        Ok(Self {
            db,
            table_name: collection.to_string(),
            metric,
        })
    }

    /// 가까운 순 `limit`개 검색 (정렬 전)
    async fn search_window(
        &self,
        table: &Table,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let stream = table
            .vector_search(embedding.to_vec())
            .map_err(|e| Error::store("Failed to create vector search", e))?
            .column(EMBEDDING_COLUMN)
            .distance_type(self.distance_type())
            .limit(limit)
            .execute()
            .await
            .map_err(|e| Error::store("Failed to execute vector search", e))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| Error::store("Failed to read search results", e))?;

        let mut results = Vec::new();
        for batch in &batches {
            Self::batch_to_results(batch, &mut results)?;
        }
        Ok(results)
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("source_path", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                EMBEDDING_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(records: &[&VectorRecord], dimension: usize) -> Result<RecordBatch> {
        let chunk_ids: Vec<&str> = records.iter().map(|r| r.chunk_id.as_str()).collect();
        let sources: Vec<&str> = records
            .iter()
            .map(|r| r.metadata.source_path.as_str())
            .collect();
        let indices: Vec<i64> = records
            .iter()
            .map(|r| r.metadata.chunk_index as i64)
            .collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<std::result::Result<_, _>>()?;

        let embeddings_flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| Error::store("Failed to create embedding array", e))?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(chunk_ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int64Array::from(indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(|e| Error::store("Failed to create RecordBatch", e))
    }

    /// 테이블 열기 (없으면 None)
    async fn open_table(&self) -> Result<Option<Table>> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::store("Failed to list tables", e))?;

        if !names.contains(&self.table_name) {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| Error::store("Failed to open table", e))?;
        Ok(Some(table))
    }

    /// 테이블 스키마에서 임베딩 차원 읽기
    async fn table_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| Error::store("Failed to read table schema", e))?;

        match schema
            .field_with_name(EMBEDDING_COLUMN)
            .map(|f| f.data_type().clone())
        {
            Ok(DataType::FixedSizeList(_, size)) => Ok(size as usize),
            _ => Err(Error::StoreUnavailable(format!(
                "Table is missing a fixed-size '{}' column",
                EMBEDDING_COLUMN
            ))),
        }
    }

    fn distance_type(&self) -> DistanceType {
        match self.metric {
            DistanceMetric::L2 => DistanceType::L2,
            DistanceMetric::Cosine => DistanceType::Cosine,
        }
    }

    /// 검색 결과 배치 파싱
    fn batch_to_results(batch: &RecordBatch, out: &mut Vec<SearchResult>) -> Result<()> {
        let chunk_ids = string_column(batch, "chunk_id")?;
        let texts = string_column(batch, "text")?;
        let metadata_json = string_column(batch, "metadata")?;

        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| Error::StoreUnavailable("Missing _distance column".to_string()))?;

        for i in 0..batch.num_rows() {
            let metadata: ChunkMetadata = serde_json::from_str(metadata_json.value(i))?;
            out.push(SearchResult {
                chunk_id: chunk_ids.value(i).to_string(),
                text: texts.value(i).to_string(),
                metadata,
                distance: distances.value(i).max(0.0),
            });
        }
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::StoreUnavailable(format!("Missing {} column", name)))
}

/// SQL 필터용 문자열 리터럴 이스케이프
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let (dimension, unique) = prepare_batch(records)?;
        if unique.is_empty() {
            return Ok(0);
        }

        let batch = Self::records_to_batch(&unique, dimension)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                let expected = Self::table_dimension(&table).await?;
                if expected != dimension {
                    return Err(Error::DimensionMismatch {
                        expected,
                        actual: dimension,
                    });
                }

                // chunk_id가 같으면 전체 교체, 없으면 삽입
                let mut merge = table.merge_insert(&["chunk_id"]);
                merge
                    .when_matched_update_all(None)
                    .when_not_matched_insert_all();
                merge
                    .execute(Box::new(batches))
                    .await
                    .map_err(|e| Error::store("Failed to upsert vectors", e))?;
            }
            None => {
                self.db
                    .create_table(&self.table_name, batches)
                    .execute()
                    .await
                    .map_err(|e| Error::store("Failed to create table", e))?;
                tracing::info!(
                    "Created collection '{}' (dimension: {})",
                    self.table_name,
                    dimension
                );
            }
        }

        Ok(unique.len())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be >= 1".to_string()));
        }

        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| Error::store("Failed to count rows", e))?;
        if rows == 0 {
            return Ok(vec![]);
        }

        let expected = Self::table_dimension(&table).await?;
        if embedding.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        // 컷오프 거리와 같은 행이 더 있으면 창을 넓혀 chunk_id 순으로 고르게 함
        let mut window = (top_k + 1).min(rows);
        let results = loop {
            let mut results = self.search_window(&table, embedding, window).await?;
            sort_results(&mut results);

            let tied_at_cutoff = results.len() > top_k
                && results[results.len() - 1].distance <= results[top_k - 1].distance;
            if !tied_at_cutoff || window >= rows {
                break results;
            }
            window = (window * 2).min(rows);
        };

        Ok(results.into_iter().take(top_k).collect())
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        table
            .count_rows(None)
            .await
            .map_err(|e| Error::store("Failed to count rows", e))
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        match self.open_table().await? {
            Some(table) => Ok(Some(Self::table_dimension(&table).await?)),
            None => Ok(None),
        }
    }

    async fn prune_source(&self, source_path: &str, keep: usize) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let filter = format!(
            "source_path = {} AND chunk_index >= {}",
            sql_quote(source_path),
            keep as i64
        );

        let stale = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| Error::store("Failed to count stale rows", e))?;
        if stale == 0 {
            return Ok(0);
        }

        table
            .delete(&filter)
            .await
            .map_err(|e| Error::store("Failed to delete stale rows", e))?;

        tracing::debug!("Pruned {} stale chunk(s) of {}", stale, source_path);
        Ok(stale)
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn create_test_entry(source: &str, chunk_index: usize, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk_id: format!("{}#{}", source, chunk_index),
            text: format!("Test chunk {} for {}", chunk_index, source),
            embedding,
            metadata: ChunkMetadata {
                source_path: source.to_string(),
                title: source.to_string(),
                chunk_index,
                doc_id: None,
                doc_hash: Some("abc".to_string()),
                tags: vec!["t".to_string()],
            },
        }
    }

    fn unit(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[i % DIM] = 1.0;
        v
    }

    async fn open_store(dir: &TempDir) -> LanceVectorStore {
        LanceVectorStore::open(&dir.path().join("vectors"), "kb_chunks", DistanceMetric::L2)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.dimension().await.unwrap(), None);
        assert!(store.query(&unit(0), 3).await.unwrap().is_empty());

        let entries = vec![create_test_entry("a.md", 0, unit(0)), create_test_entry("a.md", 1, unit(1))];
        assert_eq!(store.upsert(&entries).await.unwrap(), 2);

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.dimension().await.unwrap(), Some(DIM));
    }

    #[tokio::test]
    async fn test_lance_search_exact_match_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let entries: Vec<VectorRecord> = (0..DIM)
            .map(|i| create_test_entry("doc.md", i, unit(i)))
            .collect();
        store.upsert(&entries).await.unwrap();

        let results = store.query(&unit(2), 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "doc.md#2");
        assert!(results[0].distance.abs() < 1e-5);
        assert!(results[0].distance <= results[1].distance);
        assert_eq!(results[0].metadata.chunk_index, 2);
        assert_eq!(results[0].metadata.tags, vec!["t".to_string()]);
    }

    #[tokio::test]
    async fn test_lance_upsert_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let entries = vec![create_test_entry("a.md", 0, unit(0)), create_test_entry("a.md", 1, unit(1))];
        store.upsert(&entries).await.unwrap();
        store.upsert(&entries).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let mut changed = create_test_entry("a.md", 0, unit(3));
        changed.text = "rewritten".to_string();
        store.upsert(&[changed]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let results = store.query(&unit(3), 1).await.unwrap();
        assert_eq!(results[0].chunk_id, "a.md#0");
        assert_eq!(results[0].text, "rewritten");
    }

    #[tokio::test]
    async fn test_lance_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;
        store
            .upsert(&[create_test_entry("a.md", 0, unit(0))])
            .await
            .unwrap();

        assert!(matches!(
            store.query(&[1.0, 0.0], 1).await,
            Err(Error::DimensionMismatch { expected: DIM, actual: 2 })
        ));
        assert!(matches!(
            store
                .upsert(&[create_test_entry("b.md", 0, vec![1.0; DIM + 1])])
                .await,
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_lance_prune_source() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        let entries = vec![
            create_test_entry("a.md", 0, unit(0)),
            create_test_entry("a.md", 1, unit(1)),
            create_test_entry("a.md", 2, unit(2)),
            create_test_entry("it's.md", 1, unit(3)),
        ];
        store.upsert(&entries).await.unwrap();

        assert_eq!(store.prune_source("a.md", 1).await.unwrap(), 2);
        assert_eq!(store.prune_source("it's.md", 0).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lance_reopen_persists() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(&temp_dir).await;
            store
                .upsert(&[create_test_entry("a.md", 0, unit(0))])
                .await
                .unwrap();
        }
        let store = open_store(&temp_dir).await;
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lance_ties_at_cutoff_follow_chunk_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        // 같은 임베딩 5개 + 먼 벡터 1개
        let mut entries: Vec<VectorRecord> = (0..5)
            .rev()
            .map(|i| create_test_entry("same.md", i, unit(0)))
            .collect();
        entries.push(create_test_entry("far.md", 0, unit(1)));
        store.upsert(&entries).await.unwrap();

        let results = store.query(&unit(0), 2).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["same.md#0", "same.md#1"]);
    }

    #[tokio::test]
    async fn test_lance_cosine_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(
            &temp_dir.path().join("vectors"),
            "kb_chunks",
            DistanceMetric::Cosine,
        )
        .await
        .unwrap();

        let entries = vec![
            create_test_entry("a.md", 0, vec![1.0, 0.0, 0.0, 0.0]),
            create_test_entry("a.md", 1, vec![1.0, 1.0, 0.0, 0.0]),
            create_test_entry("a.md", 2, vec![0.0, 0.0, 1.0, 0.0]),
        ];
        store.upsert(&entries).await.unwrap();

        // 크기만 다른 벡터도 코사인 거리 0
        let results = store.query(&[3.0, 0.0, 0.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_id, "a.md#0");
        assert!(results[0].distance.abs() < 1e-4);
        assert_eq!(results[2].chunk_id, "a.md#2");
        assert!(results.iter().all(|r| r.distance >= 0.0));
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_lance_open_on_regular_file_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, "occupied").unwrap();

        let result = LanceVectorStore::open(&file, "kb_chunks", DistanceMetric::L2).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn test_sql_quote() {
        assert_eq!(sql_quote("a.md"), "'a.md'");
        assert_eq!(sql_quote("it's"), "'it''s'");
    }
}
