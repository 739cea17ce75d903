//! In-memory [`VectorStore`] 구현
//!
//! 테스트와 드라이런용입니다. 영속성 없이 `RwLock<HashMap>`에 보관하고
//! 검색은 전체 레코드에 대한 brute-force 거리 계산입니다.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::config::DistanceMetric;
use crate::error::{Error, Result};

use super::vector::{
    distance, prepare_batch, sort_results, SearchResult, VectorRecord, VectorStore,
};

#[derive(Default)]
struct Collection {
    dimension: Option<usize>,
    records: HashMap<String, VectorRecord>,
}

/// 메모리 벡터 저장소
pub struct InMemoryVectorStore {
    metric: DistanceMetric,
    inner: RwLock<Collection>,
}

impl InMemoryVectorStore {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            inner: RwLock::new(Collection::default()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(DistanceMetric::L2)
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::store("Lock error", e)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let (dimension, unique) = prepare_batch(records)?;
        if unique.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.write().map_err(poisoned)?;
        if let Some(expected) = inner.dimension {
            if expected != dimension {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
        }
        inner.dimension = Some(dimension);

        for record in &unique {
            inner
                .records
                .insert(record.chunk_id.clone(), (*record).clone());
        }

        Ok(unique.len())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be >= 1".to_string()));
        }

        let inner = self.inner.read().map_err(poisoned)?;
        let Some(expected) = inner.dimension else {
            return Ok(vec![]);
        };
        if inner.records.is_empty() {
            return Ok(vec![]);
        }
        if embedding.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        let mut results: Vec<SearchResult> = inner
            .records
            .values()
            .map(|r| SearchResult {
                chunk_id: r.chunk_id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                distance: distance(self.metric, embedding, &r.embedding),
            })
            .collect();

        sort_results(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.records.len())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.inner.read().map_err(poisoned)?.dimension)
    }

    async fn prune_source(&self, source_path: &str, keep: usize) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let before = inner.records.len();
        inner
            .records
            .retain(|_, r| !(r.metadata.source_path == source_path && r.metadata.chunk_index >= keep));
        Ok(before - inner.records.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::ChunkMetadata;

    fn entry(id: &str, source: &str, index: usize, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk_id: id.to_string(),
            text: format!("chunk {}", id),
            embedding,
            metadata: ChunkMetadata {
                source_path: source.to_string(),
                title: source.to_string(),
                chunk_index: index,
                doc_id: None,
                doc_hash: None,
                tags: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = InMemoryVectorStore::default();
        assert!(store.query(&[1.0, 2.0], 5).await.unwrap().is_empty());
        assert_eq!(store.dimension().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_and_exact_match_first() {
        let store = InMemoryVectorStore::default();
        let records = vec![
            entry("a", "a.md", 0, vec![1.0, 0.0, 0.0]),
            entry("b", "a.md", 1, vec![0.0, 1.0, 0.0]),
            entry("c", "b.md", 0, vec![0.0, 0.0, 1.0]),
        ];
        assert_eq!(store.upsert(&records).await.unwrap(), 3);

        let results = store.query(&[0.0, 1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "b");
        assert!(results[0].distance.abs() < 1e-6);
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = InMemoryVectorStore::default();
        store.upsert(&[entry("a", "a.md", 0, vec![1.0, 0.0])]).await.unwrap();

        let mut updated = entry("a", "a.md", 0, vec![0.0, 1.0]);
        updated.text = "updated".to_string();
        store.upsert(&[updated]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results[0].text, "updated");
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = InMemoryVectorStore::default();
        store.upsert(&[entry("a", "a.md", 0, vec![1.0, 0.0])]).await.unwrap();

        assert!(matches!(
            store.query(&[1.0, 0.0, 0.0], 1).await,
            Err(Error::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            store.upsert(&[entry("b", "a.md", 1, vec![1.0])]).await,
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_upsert_empty_is_noop() {
        let store = InMemoryVectorStore::default();
        store.upsert(&[entry("a", "a.md", 0, vec![1.0])]).await.unwrap();
        assert_eq!(store.upsert(&[]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune_source() {
        let store = InMemoryVectorStore::default();
        store
            .upsert(&[
                entry("a0", "a.md", 0, vec![1.0]),
                entry("a1", "a.md", 1, vec![1.0]),
                entry("a2", "a.md", 2, vec![1.0]),
                entry("b2", "b.md", 2, vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.prune_source("a.md", 1).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let store = InMemoryVectorStore::default();
        assert!(matches!(
            store.query(&[1.0], 0).await,
            Err(Error::InvalidQuery(_))
        ));
    }
}
