//! Knowledge 모듈 - 청킹, 벡터 저장, 검색
//!
//! - Chunker: 재귀 경계 텍스트 분할
//! - LanceDB: 컬렉션 단위 영속 벡터 저장소 (빌드 / 로드)
//! - Retriever: top_k / 검색 방식 고정 조회

mod chunker;
mod lance;
mod lock;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{
    Chunk, ChunkMetadata, RecursiveSplitter,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use lance::{
    IngestOptions, LanceVectorStore,
    DEFAULT_BATCH_SIZE, DEFAULT_COLLECTION_NAME, DEFAULT_CONCURRENCY, DEFAULT_PERSIST_DIRECTORY,
};
pub use lock::IndexLock;
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use vector::{
    VectorStore, RetrievedChunk, SearchType, StoredVector,
    cosine_similarity, rank_records,
    DEFAULT_FETCH_K, DEFAULT_LAMBDA_MULT,
};
