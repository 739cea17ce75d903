//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! 컬렉션 단위로 `(chunk_id, text, embedding, metadata)` 레코드를 보관하고
//! `chunk_id` 기준 upsert, 최근접 이웃 검색을 제공합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DistanceMetric, VectorBackend, VectorSettings};
use crate::error::{Error, Result};

use super::lance::LanceVectorStore;
use super::memory::InMemoryVectorStore;

// ============================================================================
// Types
// ============================================================================

/// 청크 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 소스 경로 (KB 루트 기준, `/` 구분)
    pub source_path: String,
    pub title: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// 벡터 레코드 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// 컬렉션 내 기본 키
    pub chunk_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// 비유사도 (낮을수록 가까움, 0 이상)
    pub distance: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 단일 writer / 다중 reader를 가정하며, 백엔드가 보장하는 것 이상의 잠금은 하지 않습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// `chunk_id` 기준 upsert. 저장된 레코드 수 반환 (배치 내 중복은 마지막 값 사용)
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// 거리 오름차순 검색, 최대 `top_k`개
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// 레코드 수
    async fn count(&self) -> Result<usize>;

    /// 컬렉션 차원 (비어 있으면 None)
    async fn dimension(&self) -> Result<Option<usize>>;

    /// `source_path`의 레코드 중 `chunk_index >= keep`인 것 삭제
    async fn prune_source(&self, source_path: &str, keep: usize) -> Result<usize>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory
// ============================================================================

/// 설정에 맞는 벡터 저장소 열기
pub async fn open_vector_store(settings: &VectorSettings) -> Result<Box<dyn VectorStore>> {
    match settings.backend {
        VectorBackend::Lance => Ok(Box::new(
            LanceVectorStore::open(&settings.dir, &settings.collection, settings.distance).await?,
        )),
        VectorBackend::Memory => Ok(Box::new(InMemoryVectorStore::new(settings.distance))),
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 배치 검증 + 중복 제거
///
/// 모든 임베딩 차원이 같아야 하며, 같은 `chunk_id`는 마지막 레코드만 남깁니다.
/// 반환: (차원, 중복 제거된 레코드 - 첫 등장 순서 유지)
pub fn prepare_batch(records: &[VectorRecord]) -> Result<(usize, Vec<&VectorRecord>)> {
    let Some(first) = records.first() else {
        return Ok((0, Vec::new()));
    };
    let dimension = first.embedding.len();
    if dimension == 0 {
        return Err(Error::InvalidConfiguration(format!(
            "Empty embedding for chunk {}",
            first.chunk_id
        )));
    }

    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&VectorRecord> = Vec::with_capacity(records.len());

    for record in records {
        if record.embedding.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: record.embedding.len(),
            });
        }
        match positions.get(record.chunk_id.as_str()) {
            Some(&pos) => unique[pos] = record,
            None => {
                positions.insert(record.chunk_id.as_str(), unique.len());
                unique.push(record);
            }
        }
    }

    Ok((dimension, unique))
}

/// 거리 계산
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2 => squared_l2(a, b),
        DistanceMetric::Cosine => (1.0 - cosine_similarity(a, b)).max(0.0),
    }
}

/// 제곱 유클리드 거리 (LanceDB `l2`와 동일 정의)
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 결과 정렬: 거리 오름차순, 동률은 chunk_id 순
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

// ============================================================================
// Tests
// ============================================================================
