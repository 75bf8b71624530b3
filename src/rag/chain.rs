//! 질의 체인 - 검색 → 컨텍스트 조립 → 프롬프트 → 생성
//!
//! 각 단계는 따로 호출할 수 있는 메서드입니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};

use super::prompt::{assemble_context, render, FALLBACK_ANSWER, PROMPT_TEMPLATE};
use crate::error::Result;
use crate::knowledge::{RetrievedChunk, Retriever};
use crate::llm::LlmProvider;

/// 질의 응답
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    /// 답변 근거 청크 (점수 내림차순)
    pub sources: Vec<RetrievedChunk>,
    /// 검색 결과가 부족해 LLM 없이 고정 답변을 돌려줬는지
    pub fallback: bool,
}

/// 스트리밍 이벤트
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// 새로 생성된 텍스트 조각
    Delta(String),
    /// 생성 완료 (항상 마지막 이벤트)
    Done {
        answer: String,
        model: String,
        duration: Duration,
    },
}

/// 스트리밍 질의 결과
pub struct QueryStream {
    pub question: String,
    pub sources: Vec<RetrievedChunk>,
    pub fallback: bool,
    /// Delta... 후 Done 하나. 스트림을 버리면 생성도 멈춤
    pub events: BoxStream<'static, Result<GenerationEvent>>,
}

/// 검색 + 생성 체인
#[derive(Clone)]
pub struct QueryChain {
    retriever: Retriever,
    llm: Arc<dyn LlmProvider>,
}

impl QueryChain {
    pub fn new(retriever: Retriever, llm: Arc<dyn LlmProvider>) -> Self {
        Self { retriever, llm }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// 1단계: 관련 청크 검색
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        self.retriever.retrieve(question).await
    }

    /// 2단계: 컨텍스트 블록 조립
    pub fn assemble_context(&self, sources: &[RetrievedChunk]) -> String {
        assemble_context(sources)
    }

    /// 3단계: 프롬프트 렌더링
    pub fn render_prompt(&self, context: &str, question: &str) -> String {
        render(PROMPT_TEMPLATE, context, question)
    }

    /// 4단계: 답변 생성
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.llm.complete(prompt).await
    }

    /// 전체 체인 실행
    pub async fn run(&self, question: &str) -> Result<QueryResponse> {
        let sources = self.retrieve(question).await?;

        if !self.retriever.is_confident(&sources) {
            tracing::info!("Retrieval below score threshold, returning fallback answer");
            return Ok(QueryResponse {
                question: question.to_string(),
                answer: FALLBACK_ANSWER.to_string(),
                sources,
                fallback: true,
            });
        }

        let context = self.assemble_context(&sources);
        let prompt = self.render_prompt(&context, question);
        let answer = self.generate(&prompt).await?;

        Ok(QueryResponse {
            question: question.to_string(),
            answer,
            sources,
            fallback: false,
        })
    }

    /// 전체 체인 실행 (답변 스트리밍)
    pub async fn run_stream(&self, question: &str) -> Result<QueryStream> {
        let sources = self.retrieve(question).await?;
        let model = self.llm.model_name().to_string();

        if !self.retriever.is_confident(&sources) {
            tracing::info!("Retrieval below score threshold, returning fallback answer");
            let events = stream::iter(vec![
                Ok(GenerationEvent::Delta(FALLBACK_ANSWER.to_string())),
                Ok(GenerationEvent::Done {
                    answer: FALLBACK_ANSWER.to_string(),
                    model,
                    duration: Duration::ZERO,
                }),
            ]);
            return Ok(QueryStream {
                question: question.to_string(),
                sources,
                fallback: true,
                events: events.boxed(),
            });
        }

        let context = self.assemble_context(&sources);
        let prompt = self.render_prompt(&context, question);

        let started = Instant::now();
        let mut tokens = self.llm.stream(&prompt).await?;

        let events = async_stream::stream! {
            let mut answer = String::new();
            let mut failed = false;
            while let Some(item) = tokens.next().await {
                match item {
                    Ok(text) => {
                        answer.push_str(&text);
                        yield Ok(GenerationEvent::Delta(text));
                    }
                    Err(e) => {
                        failed = true;
                        yield Err(e);
                        break;
                    }
                }
            }
            if !failed {
                yield Ok(GenerationEvent::Done {
                    answer,
                    model,
                    duration: started.elapsed(),
                });
            }
        };

        Ok(QueryStream {
            question: question.to_string(),
            sources,
            fallback: false,
            events: events.boxed(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::knowledge::{ChunkMetadata, SearchType, VectorStore};
    use crate::llm::TokenStream;
    use crate::loader::DocumentMetadata;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedStore(Vec<RetrievedChunk>);

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn similarity_search(
            &self,
            _query: &str,
            top_k: usize,
            _search_type: SearchType,
        ) -> Result<Vec<RetrievedChunk>> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn collection_name(&self) -> &str {
            "fixed"
        }
    }

    /// 받은 프롬프트를 기록하고 정해진 조각을 돌려주는 LLM
    struct ScriptedLlm {
        pieces: Vec<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.pieces.concat())
        }

        async fn stream(&self, prompt: &str) -> Result<TokenStream> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let items: Vec<Result<String>> = self.pieces.iter().map(|p| Ok(p.to_string())).collect();
            Ok(stream::iter(items).boxed())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn retrieved(page: usize, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("doc.pdf:{}:0", page),
            text: text.to_string(),
            metadata: ChunkMetadata {
                document: DocumentMetadata {
                    source: "doc.pdf".to_string(),
                    page,
                    total_pages: 2,
                },
                chunk_index: 0,
            },
            score,
        }
    }

    fn chain(threshold: Option<f32>) -> (QueryChain, Arc<ScriptedLlm>) {
        let store: Arc<dyn VectorStore> = Arc::new(FixedStore(vec![
            retrieved(2, "Refunds take five days.", 0.4),
            retrieved(1, "Shipping is free.", 0.3),
        ]));
        let retriever = Retriever::new(
            Some(store),
            &RetrievalConfig {
                score_threshold: threshold,
                ..Default::default()
            },
        )
        .unwrap();
        let llm = Arc::new(ScriptedLlm {
            pieces: vec!["Five ", "days."],
            prompts: Mutex::new(Vec::new()),
        });
        (QueryChain::new(retriever, llm.clone()), llm)
    }

    #[tokio::test]
    async fn test_run_builds_prompt_from_context() {
        let (chain, llm) = chain(None);
        let response = chain.run("How long do refunds take?").await.unwrap();

        assert_eq!(response.answer, "Five days.");
        assert!(!response.fallback);
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[0].metadata.document.page, 2);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Refunds take five days.\n\nShipping is free."));
        assert!(prompts[0].contains("Question: How long do refunds take?"));
    }

    #[tokio::test]
    async fn test_low_score_falls_back_without_llm() {
        let (chain, llm) = chain(Some(0.9));
        let response = chain.run("Anything?").await.unwrap();

        assert!(response.fallback);
        assert_eq!(response.answer, FALLBACK_ANSWER);
        assert_eq!(response.sources.len(), 2);
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_emits_deltas_then_done() {
        let (chain, _) = chain(None);
        let result = chain.run_stream("How long?").await.unwrap();
        assert_eq!(result.sources.len(), 2);

        let events: Vec<GenerationEvent> = result
            .events
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], GenerationEvent::Delta(t) if t == "Five "));
        assert!(matches!(&events[1], GenerationEvent::Delta(t) if t == "days."));
        match &events[2] {
            GenerationEvent::Done { answer, model, .. } => {
                assert_eq!(answer, "Five days.");
                assert_eq!(model, "scripted");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_fallback() {
        let (chain, llm) = chain(Some(0.9));
        let result = chain.run_stream("Anything?").await.unwrap();
        assert!(result.fallback);

        let events: Vec<_> = result.events.collect().await;
        assert_eq!(events.len(), 2);
        assert!(llm.prompts.lock().unwrap().is_empty());
    }
}
