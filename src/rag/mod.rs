//! RAG 파이프라인 - 인덱싱과 질의를 묶는 상태 머신
//!
//! ```text
//! Unconfigured ─configure()→ Configured ─index_documents()→ Indexed ─┐
//!                                      └─load_vectorstore()→ Loaded ─┴─query()→ Ready
//! ```
//!
//! 질의는 Indexed / Loaded / Ready 상태에서만 가능하고, 그 전에는 LLM을
//! 호출하지 않고 `NotReady`로 실패합니다.

mod chain;
mod prompt;

pub use chain::{GenerationEvent, QueryChain, QueryResponse, QueryStream};
pub use prompt::{assemble_context, render, CONTEXT_SEPARATOR, FALLBACK_ANSWER, PROMPT_TEMPLATE};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::factory::{create_embedder, create_llm, create_vector_store};
use crate::knowledge::{
    Chunk, RecursiveSplitter, Retriever, VectorStore, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
use crate::llm::LlmProvider;
use crate::loader::{DocumentLoader, SkippedFile};

/// 파이프라인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unconfigured,
    Configured,
    Indexed,
    Loaded,
    Ready,
}

impl PipelineState {
    /// 질의 가능 여부
    pub fn can_query(&self) -> bool {
        matches!(
            self,
            PipelineState::Indexed | PipelineState::Loaded | PipelineState::Ready
        )
    }
}

/// 인덱싱 결과 요약
#[derive(Debug, Clone)]
pub struct IndexSummary {
    /// 읽은 페이지 수
    pub pages: usize,
    /// 저장한 청크 수
    pub chunks: usize,
    /// 건너뛴 파일
    pub skipped: Vec<SkippedFile>,
    pub collection: String,
}

/// RAG 파이프라인
pub struct RagPipeline {
    config: Config,
    state: PipelineState,
    llm: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn VectorStore>>,
    chain: Option<QueryChain>,
}

impl RagPipeline {
    /// 백엔드 없이 생성 (Unconfigured)
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: PipelineState::Unconfigured,
            llm: None,
            embedder: None,
            store: None,
            chain: None,
        }
    }

    /// 생성 후 바로 configure
    pub fn from_config(config: Config) -> Result<Self> {
        let mut pipeline = Self::new(config);
        pipeline.configure()?;
        Ok(pipeline)
    }

    /// 이미 만든 백엔드로 생성 (Configured)
    pub fn with_backends(
        config: Config,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            state: PipelineState::Configured,
            llm: Some(llm),
            embedder: Some(embedder),
            store: None,
            chain: None,
        }
    }

    /// 팩토리로 LLM / 임베딩 백엔드 생성
    ///
    /// 이미 구성된 경우 아무것도 하지 않습니다.
    pub fn configure(&mut self) -> Result<()> {
        if self.state != PipelineState::Unconfigured {
            return Ok(());
        }

        let llm = create_llm(&self.config.llm)?;
        let embedder = create_embedder(&self.config.embedding)?;

        self.llm = Some(llm);
        self.embedder = Some(embedder);
        self.state = PipelineState::Configured;
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 현재 벡터 저장소 (인덱싱/로드 이후)
    pub fn vector_store(&self) -> Option<&Arc<dyn VectorStore>> {
        self.store.as_ref()
    }

    fn splitter(&self) -> Result<RecursiveSplitter> {
        let processing = &self.config.document_processing;
        RecursiveSplitter::new(
            processing.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            processing.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
        )
    }

    fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.embedder.clone().ok_or(RagError::NotReady)
    }

    /// PDF 파일 또는 폴더를 인덱싱 (build 모드)
    pub async fn index_documents(&mut self, path: impl AsRef<Path>) -> Result<IndexSummary> {
        self.index_documents_with_cancel(path, &CancellationToken::new())
            .await
    }

    /// 취소 가능한 인덱싱
    ///
    /// 취소되거나 실패하면 기존 인덱스와 파이프라인 상태는 그대로입니다.
    pub async fn index_documents_with_cancel(
        &mut self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<IndexSummary> {
        self.configure()?;
        let embedder = self.embedder()?;
        let splitter = self.splitter()?;
        let path = path.as_ref().to_path_buf();

        tracing::info!("Indexing documents from {:?}", path);

        let (chunks, pages, skipped) = load_and_split(path.clone(), splitter).await?;

        tracing::info!("Loaded {} page(s), created {} chunk(s)", pages, chunks.len());
        for file in &skipped {
            tracing::warn!("Skipped {:?}: {}", file.path, file.reason);
        }

        if chunks.is_empty() {
            return Err(RagError::NoChunks(path));
        }

        let store = create_vector_store(&self.config, &chunks, embedder, cancel).await?;

        let summary = IndexSummary {
            pages,
            chunks: chunks.len(),
            skipped,
            collection: store.collection_name().to_string(),
        };

        self.store = Some(store);
        self.chain = None;
        self.state = PipelineState::Indexed;
        Ok(summary)
    }

    /// 저장된 인덱스 열기 (load 모드)
    pub async fn load_vectorstore(&mut self) -> Result<()> {
        self.configure()?;
        let embedder = self.embedder()?;

        let store = create_vector_store(&self.config, &[], embedder, &CancellationToken::new()).await?;
        tracing::info!(
            "Loaded vector store '{}' ({} chunks)",
            store.collection_name(),
            store.count().await?
        );

        self.store = Some(store);
        self.chain = None;
        self.state = PipelineState::Loaded;
        Ok(())
    }

    /// 질의 체인 준비 (처음 질의할 때 생성, Ready로 전환)
    fn ensure_chain(&mut self) -> Result<QueryChain> {
        if !self.state.can_query() {
            return Err(RagError::NotReady);
        }

        if let Some(chain) = &self.chain {
            return Ok(chain.clone());
        }

        let llm = self.llm.clone().ok_or(RagError::NotReady)?;
        let retriever = Retriever::new(self.store.clone(), &self.config.retrieval)?;
        let chain = QueryChain::new(retriever, llm);

        self.chain = Some(chain.clone());
        self.state = PipelineState::Ready;
        Ok(chain)
    }

    /// 질문에 답변
    pub async fn query(&mut self, question: &str) -> Result<QueryResponse> {
        let chain = self.ensure_chain()?;
        tracing::info!("Query: {}", question);
        chain.run(question).await
    }

    /// 질문에 답변 (스트리밍)
    pub async fn query_stream(&mut self, question: &str) -> Result<QueryStream> {
        let chain = self.ensure_chain()?;
        tracing::info!("Streaming query: {}", question);
        chain.run_stream(question).await
    }
}

/// 로드와 분할은 블로킹 작업이므로 별도 스레드에서 실행
async fn load_and_split(
    path: PathBuf,
    splitter: RecursiveSplitter,
) -> Result<(Vec<Chunk>, usize, Vec<SkippedFile>)> {
    let task_path = path.clone();
    let handle = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut source = DocumentLoader::load_path(&task_path)?;
        let mut pages = 0usize;
        let mut chunks = Vec::new();

        for document in source.by_ref() {
            pages += 1;
            chunks.extend(splitter.split_documents(std::iter::once(document)));
        }

        Ok((chunks, pages, source.skipped().to_vec()))
    });

    handle.await.map_err(|e| RagError::PdfExtract {
        path,
        message: format!("loader task failed: {}", e),
    })?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for CountingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("answer".to_string())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn pipeline() -> (RagPipeline, Arc<CountingLlm>) {
        let llm = Arc::new(CountingLlm {
            calls: AtomicUsize::new(0),
        });
        let embedder = Arc::new(HashEmbedding::new(32).unwrap());
        let pipeline = RagPipeline::with_backends(Config::default(), llm.clone(), embedder);
        (pipeline, llm)
    }

    #[test]
    fn test_new_is_unconfigured() {
        let pipeline = RagPipeline::new(Config::default());
        assert_eq!(pipeline.state(), PipelineState::Unconfigured);
        assert!(pipeline.vector_store().is_none());
    }

    #[test]
    fn test_configure_without_api_keys() {
        let config = Config::from_yaml_str("embedding:\n  type: hash\n").unwrap();
        let pipeline = RagPipeline::from_config(config).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);
    }

    #[test]
    fn test_configure_rejects_unknown_llm() {
        let config = Config::from_yaml_str("llm:\n  type: huggingface\n").unwrap();
        let mut pipeline = RagPipeline::new(config);
        assert!(matches!(
            pipeline.configure(),
            Err(RagError::UnsupportedBackend { .. })
        ));
        assert_eq!(pipeline.state(), PipelineState::Unconfigured);
    }

    #[tokio::test]
    async fn test_query_before_index_is_not_ready() {
        let (mut pipeline, llm) = pipeline();

        assert!(matches!(pipeline.query("q").await, Err(RagError::NotReady)));
        assert!(matches!(
            pipeline.query_stream("q").await,
            Err(RagError::NotReady)
        ));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), PipelineState::Configured);
    }

    #[tokio::test]
    async fn test_index_missing_path_keeps_state() {
        let (mut pipeline, _) = pipeline();
        let result = pipeline.index_documents("/no/such/file.pdf").await;
        assert!(matches!(result, Err(RagError::NotFound(_))));
        assert_eq!(pipeline.state(), PipelineState::Configured);
    }

    #[tokio::test]
    async fn test_index_empty_directory_has_no_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut pipeline, _) = pipeline();
        let result = pipeline.index_documents(dir.path()).await;
        assert!(matches!(result, Err(RagError::NoChunks(_))));
    }
}
