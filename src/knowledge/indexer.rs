//! Knowledge Base Indexer
//!
//! 마크다운 디렉토리 → 청킹 → 임베딩 → upsert, 그리고 쿼리 → 임베딩 → 검색.
//!
//! 한 번의 실행에서 모든 임베딩을 먼저 계산한 뒤에 저장합니다.
//! 임베딩 호출이 하나라도 실패하면 아무것도 쓰지 않고 에러를 반환합니다.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::collector::{CollectedFile, CollectorConfig, FileCollector};
use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::{Error, Result};

use super::chunk_id::derive_chunk_id;
use super::chunker::{ChunkConfig, Chunker, MarkdownChunker};
use super::front_matter::parse_front_matter;
use super::vector::{ChunkMetadata, SearchResult, VectorRecord, VectorStore};

/// 기본 임베딩 배치 크기
const DEFAULT_BATCH_SIZE: usize = 64;

/// 인덱싱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files_processed: usize,
    pub chunks_written: usize,
    /// 문서가 줄어들어 삭제된 이전 청크 수
    pub orphans_pruned: usize,
}

/// 임베딩 전 청크
struct PendingChunk {
    chunk_id: String,
    text: String,
    metadata: ChunkMetadata,
}

/// 지식베이스 인덱서
pub struct KnowledgeBaseIndexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunker: MarkdownChunker,
    batch_size: usize,
    prune_orphans: bool,
}

impl KnowledgeBaseIndexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        chunker: MarkdownChunker,
    ) -> Self {
        Self {
            embedder,
            store,
            chunker,
            batch_size: DEFAULT_BATCH_SIZE,
            prune_orphans: true,
        }
    }

    /// 설정값(청킹, 배치, 고아 정리)으로 생성
    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let chunker = MarkdownChunker::new(ChunkConfig::from(&settings.chunking))?;
        Ok(Self::new(embedder, store, chunker)
            .with_batch_size(settings.embedding.batch_size)?
            .with_prune_orphans(settings.index.prune_orphans))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "batch_size must be > 0".to_string(),
            ));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn with_prune_orphans(mut self, prune: bool) -> Self {
        self.prune_orphans = prune;
        self
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// 디렉토리 인덱싱
    ///
    /// `root` 아래의 `*.md`(재귀, `_` 파일 제외)를 경로 순으로 처리합니다.
    /// 루트가 없으면 경고 후 빈 결과를 반환합니다.
    pub async fn index_directory(&self, root: &Path) -> Result<IndexReport> {
        if !root.is_dir() {
            tracing::warn!("Knowledge base directory not found: {:?}", root);
            return Ok(IndexReport::default());
        }

        let files = FileCollector::new(CollectorConfig::knowledge_base()).collect_directory(root)?;

        let mut pending = Vec::new();
        let mut per_source: Vec<(String, usize)> = Vec::with_capacity(files.len());

        for file in &files {
            let chunks = self.chunk_file(file).await?;
            tracing::debug!("{}: {} chunk(s)", file.relative, chunks.len());
            per_source.push((file.relative.clone(), chunks.len()));
            pending.extend(chunks);
        }

        // 1. 모든 임베딩 계산 (실패 시 아무것도 쓰지 않음)
        let embeddings = self.embed_all(&pending).await?;

        // 2. upsert
        let records: Vec<VectorRecord> = pending
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord {
                chunk_id: chunk.chunk_id,
                text: chunk.text,
                embedding,
                metadata: chunk.metadata,
            })
            .collect();
        let chunks_written = self.store.upsert(&records).await?;

        // 3. 줄어든 문서의 남은 청크 정리
        let mut orphans_pruned = 0;
        if self.prune_orphans {
            for (source, count) in &per_source {
                orphans_pruned += self.store.prune_source(source, *count).await?;
            }
        }

        let report = IndexReport {
            files_processed: files.len(),
            chunks_written,
            orphans_pruned,
        };
        tracing::info!(
            "Indexed {} file(s), {} chunk(s) written, {} orphan(s) pruned",
            report.files_processed,
            report.chunks_written,
            report.orphans_pruned
        );
        Ok(report)
    }

    /// 파일 하나를 읽어 청크 생성
    async fn chunk_file(&self, file: &CollectedFile) -> Result<Vec<PendingChunk>> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| Error::io(&file.path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        let doc = parse_front_matter(&content);

        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.relative.clone());

        let title = doc.front_matter.title.clone().unwrap_or_else(|| stem.clone());
        let doc_id = doc.front_matter.id.clone().unwrap_or(stem);
        let doc_hash = format!("{:x}", Sha256::digest(doc.body.as_bytes()));

        Ok(self
            .chunker
            .chunk(&doc.body)
            .into_iter()
            .enumerate()
            .map(|(index, text)| PendingChunk {
                chunk_id: derive_chunk_id(&file.relative, index),
                text,
                metadata: ChunkMetadata {
                    source_path: file.relative.clone(),
                    title: title.clone(),
                    chunk_index: index,
                    doc_id: Some(doc_id.clone()),
                    doc_hash: Some(doc_hash.clone()),
                    tags: doc.front_matter.tags.clone(),
                },
            })
            .collect())
    }

    /// 배치 단위 임베딩 (순서 유지)
    async fn embed_all(&self, chunks: &[PendingChunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} text(s)) via {}",
                i + 1,
                batch.len(),
                self.embedder.name()
            );
            let vectors = self.embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(Error::provider(format!(
                    "Expected {} embeddings, provider returned {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// 시맨틱 검색 (저장소 순서 그대로 반환)
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be >= 1".to_string()));
        }

        let embedding = self.embedder.embed(query).await?;
        self.store.query(&embedding, top_k).await
    }
}

// ============================================================================
// Tests
// ============================================================================
