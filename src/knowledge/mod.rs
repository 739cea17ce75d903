//! Knowledge 모듈 - 마크다운 지식베이스 인덱싱/검색
//!
//! - Chunker: Markdown 헤더 인식 + 오버랩 윈도우 분할
//! - Chunk ID: (소스, 위치) 기반 결정적 UUID v5
//! - VectorStore: LanceDB(디스크) / 메모리 백엔드
//! - Indexer: 디렉토리 → 청크 → 임베딩 → upsert, 쿼리 → 검색

mod chunk_id;
mod chunker;
mod front_matter;
mod indexer;
mod lance;
mod memory;
mod vector;

// Re-exports
pub use chunk_id::derive_chunk_id;
pub use chunker::{chunk_markdown, ChunkConfig, Chunker, MarkdownChunker};
pub use front_matter::{parse_front_matter, FrontMatter, ParsedDocument};
pub use indexer::{IndexReport, KnowledgeBaseIndexer};
pub use lance::LanceVectorStore;
pub use memory::InMemoryVectorStore;
pub use vector::{
    cosine_similarity, distance, open_vector_store, ChunkMetadata, SearchResult, VectorRecord,
    VectorStore,
};
