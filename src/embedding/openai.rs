//! OpenAI 임베딩
//!
//! source: https://platform.openai.com/docs/api-reference/embeddings

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::post_with_retry;
use super::{non_empty_inputs, scatter_embeddings, EmbeddingProvider};
use crate::error::{RagError, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// `openai` 타입 기본 모델
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// `openai-large` 타입 기본 모델
pub const DEFAULT_OPENAI_LARGE_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// 요청당 최대 입력 수
const MAX_BATCH: usize = 2048;

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: Option<String>,
    client: reqwest::Client,
    model: String,
    base_url: String,
    dimension: usize,
    /// 설정에서 차원을 명시한 경우에만 `dimensions` 파라미터 전송
    requested_dimension: Option<usize>,
    max_retries: u32,
}

impl OpenAiEmbedding {
    /// 새 OpenAI 임베딩 인스턴스 생성
    ///
    /// `dimension`이 없으면 모델의 기본 차원을 사용합니다.
    pub fn new(
        api_key: Option<String>,
        model: String,
        dimension: Option<usize>,
        timeout: Duration,
    ) -> Result<Self> {
        let native = native_dimension(&model);
        let resolved = match (dimension, native) {
            (Some(d), _) if d > 0 => d,
            (Some(_), _) => {
                return Err(RagError::InvalidConfig(
                    "embedding dimension must be positive".to_string(),
                ))
            }
            (None, Some(d)) => d,
            (None, None) => {
                return Err(RagError::InvalidConfig(format!(
                    "unknown dimension for embedding model '{}': set embedding.dimension",
                    model
                )))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            dimension: resolved,
            requested_dimension: dimension,
            max_retries: 0,
        })
    }

    /// 베이스 URL 변경 (호환 서버용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RagError::MissingApiKey("OPENAI_API_KEY".to_string()))
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.requested_dimension,
        };

        let body = post_with_retry(
            || self.client.post(&url).bearer_auth(api_key).json(&request),
            self.max_retries,
            "OpenAI embedding request",
            None,
        )
        .await?;

        let mut response: EmbeddingsResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::Embedding(format!("failed to parse OpenAI embedding response: {}", e))
        })?;

        if response.data.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "OpenAI returned {} embeddings for {} inputs",
                response.data.len(),
                inputs.len()
            )));
        }

        // 응답 순서는 index 필드 기준
        response.data.sort_by_key(|d| d.index);

        response
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.dimension {
                    Err(RagError::DimensionMismatch {
                        expected: self.dimension,
                        actual: d.embedding.len(),
                    })
                } else {
                    Ok(d.embedding)
                }
            })
            .collect()
    }
}

/// 모델별 기본 차원
fn native_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // OpenAI는 빈 문자열 입력을 거부함
        let (indices, inputs) = non_empty_inputs(texts);
        let mut vectors = Vec::with_capacity(inputs.len());

        for group in inputs.chunks(MAX_BATCH) {
            vectors.extend(self.request(group).await?);
        }

        Ok(scatter_embeddings(
            texts.len(),
            self.dimension,
            &indices,
            vectors,
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_dimensions() {
        let small = OpenAiEmbedding::new(
            None,
            DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(small.dimension(), 1536);

        let large = OpenAiEmbedding::new(
            None,
            DEFAULT_OPENAI_LARGE_EMBEDDING_MODEL.to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(large.dimension(), 3072);
    }

    #[test]
    fn test_unknown_model_requires_dimension() {
        let result = OpenAiEmbedding::new(
            None,
            "my-local-model".to_string(),
            None,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));

        let explicit = OpenAiEmbedding::new(
            None,
            "my-local-model".to_string(),
            Some(256),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(explicit.dimension(), 256);
    }

    #[tokio::test]
    async fn test_missing_key_fails_on_call() {
        let embedder = OpenAiEmbedding::new(
            None,
            DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(RagError::MissingApiKey(_))));
    }

    /// 연결은 받지만 응답하지 않는 로컬 서버
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let embedder = OpenAiEmbedding::new(
            Some("sk-test".to_string()),
            DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            None,
            Duration::from_millis(200),
        )
        .unwrap()
        .with_base_url(silent_server().await);

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_request_omits_default_dimensions() {
        let inputs = vec!["a".to_string()];
        let request = EmbeddingsRequest {
            model: "text-embedding-3-small",
            input: &inputs,
            dimensions: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["input"][0], "a");
    }
}
