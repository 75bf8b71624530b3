//! pdf-rag - PDF 문서 기반 질의응답 (RAG)
//!
//! PDF를 페이지 단위로 읽어 청크로 나누고, 임베딩하여 LanceDB에 저장한 뒤
//! 질문과 관련된 청크를 찾아 LLM으로 답변을 생성합니다.
//!
//! ```text
//! index: Loader → Splitter → Embedder → LanceDB
//! query: Retriever → context → prompt → LLM → answer
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod factory;
pub mod knowledge;
pub mod llm;
pub mod loader;
pub mod rag;

// Re-exports
pub use config::Config;
pub use embedding::{EmbeddingProvider, HashEmbedding, get_api_key, has_api_key};
pub use error::{ErrorCategory, RagError, Result};
pub use knowledge::{
    Chunk, ChunkMetadata, LanceVectorStore, RecursiveSplitter, RetrievedChunk, Retriever,
    SearchType, VectorStore,
};
pub use llm::LlmProvider;
pub use loader::{Document, DocumentLoader, DocumentMetadata};
pub use rag::{GenerationEvent, PipelineState, QueryResponse, QueryStream, RagPipeline};
