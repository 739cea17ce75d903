//! kb-pipeline - 마크다운 지식베이스 파이프라인
//!
//! 업로드 문서 수집/정규화, 마크다운 지식베이스의 청킹 + 임베딩 + LanceDB 인덱싱,
//! 시맨틱 검색, 정적 HTML 빌드, 그리고 리뷰를 거치는 지식베이스 수정 제안 워크플로를 제공합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod html;
pub mod knowledge;
pub mod pipeline;
pub mod suggestion;

// Re-exports
pub use config::Settings;
pub use embedding::{create_embedder, Embedder};
pub use error::{Error, Result};
pub use extractor::{normalize_text, DocumentParser, ParserRegistry};
pub use knowledge::{
    chunk_markdown, derive_chunk_id, open_vector_store, ChunkConfig, ChunkMetadata, Chunker,
    IndexReport, InMemoryVectorStore, KnowledgeBaseIndexer, LanceVectorStore, MarkdownChunker,
    SearchResult, VectorRecord, VectorStore,
};
