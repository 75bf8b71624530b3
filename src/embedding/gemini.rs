//! Google Gemini 임베딩
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! 문서는 `RETRIEVAL_DOCUMENT`, 검색 쿼리는 `RETRIEVAL_QUERY` 태스크로 임베딩합니다.
//! 배치는 `batchEmbedContents` (요청당 최대 100개)를 사용합니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::http::{post_with_retry, RateLimiter};
use super::{non_empty_inputs, scatter_embeddings, EmbeddingProvider};
use crate::error::{RagError, Result};

/// Gemini API 베이스 URL
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 기본 임베딩 모델 (MRL 지원)
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_GEMINI_DIMENSION: usize = 768;

/// Gemini 무료 티어 기본 제한 (60 RPM)
const DEFAULT_RPM: u32 = 60;

/// batchEmbedContents 요청당 최대 입력 수
const MAX_BATCH: usize = 100;

const TASK_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";
const TASK_QUERY: &str = "RETRIEVAL_QUERY";

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: Option<String>,
    client: reqwest::Client,
    model: String,
    base_url: String,
    dimension: usize,
    max_retries: u32,
    rate_limiter: Mutex<RateLimiter>,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키 (없으면 호출 시 `MissingApiKey`)
    /// * `model` - 모델 이름
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    /// * `timeout` - 요청 타임아웃
    pub fn new(
        api_key: Option<String>,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        // 유효한 차원 확인
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(RagError::InvalidConfig(format!(
                "invalid Gemini embedding dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            dimension,
            max_retries: 0,
            rate_limiter: Mutex::new(RateLimiter::per_minute(DEFAULT_RPM)),
        })
    }

    /// 베이스 URL 변경
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 재시도 횟수 설정 (429 / 5xx / 전송 오류)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 분당 요청 수 제한 변경
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.rate_limiter = Mutex::new(RateLimiter::per_minute(rpm));
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RagError::MissingApiKey("GEMINI_API_KEY or GOOGLE_AI_API_KEY".to_string())
        })
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn request_for(&self, text: &str, task_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.model_path(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.to_string(),
            output_dimensionality: Some(self.dimension),
        }
    }

    async fn embed_single(&self, text: &str, task_type: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let api_key = self.api_key()?;
        let url = format!("{}/{}:embedContent", self.base_url, self.model_path());
        let request = self.request_for(text, task_type);

        // API 키는 URL이 아닌 헤더로 전송
        let body = post_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-goog-api-key", api_key)
                    .json(&request)
            },
            self.max_retries,
            "Gemini embedding request",
            Some(&self.rate_limiter),
        )
        .await?;

        let response: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::Embedding(format!("failed to parse Gemini embedding response: {}", e))
        })?;

        self.check_dimension(response.embedding.values)
    }

    fn check_dimension(&self, values: Vec<f32>) -> Result<Vec<f32>> {
        if values.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single(text, TASK_DOCUMENT).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (indices, inputs) = non_empty_inputs(texts);
        if inputs.is_empty() {
            return Ok(scatter_embeddings(texts.len(), self.dimension, &[], vec![]));
        }

        let api_key = self.api_key()?;
        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model_path());
        let mut vectors = Vec::with_capacity(inputs.len());

        for (i, group) in inputs.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(
                "Gemini batch {}/{} ({} texts)",
                i + 1,
                inputs.len().div_ceil(MAX_BATCH),
                group.len()
            );

            let request = BatchEmbedRequest {
                requests: group
                    .iter()
                    .map(|t| self.request_for(t, TASK_DOCUMENT))
                    .collect(),
            };

            let body = post_with_retry(
                || {
                    self.client
                        .post(&url)
                        .header("x-goog-api-key", api_key)
                        .json(&request)
                },
                self.max_retries,
                "Gemini batch embedding request",
                Some(&self.rate_limiter),
            )
            .await?;

            let response: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
                RagError::Embedding(format!("failed to parse Gemini batch response: {}", e))
            })?;

            if response.embeddings.len() != group.len() {
                return Err(RagError::Embedding(format!(
                    "Gemini returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    group.len()
                )));
            }

            for values in response.embeddings {
                vectors.push(self.check_dimension(values.values)?);
            }
        }

        Ok(scatter_embeddings(
            texts.len(),
            self.dimension,
            &indices,
            vectors,
        ))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single(text, TASK_QUERY).await
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

    fn embedder(dim: usize) -> Result<GeminiEmbedding> {
        GeminiEmbedding::new(
            Some("fake_key".to_string()),
            DEFAULT_GEMINI_EMBEDDING_MODEL.to_string(),
            dim,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_invalid_dimension() {
        let result = embedder(999);
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
        assert!(result
            .err()
            .map(|e| e.to_string().contains("invalid Gemini embedding dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            assert!(embedder(dim).is_ok());
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_on_call_not_construction() {
        let embedder = GeminiEmbedding::new(
            None,
            DEFAULT_GEMINI_EMBEDDING_MODEL.to_string(),
            768,
            Duration::from_secs(5),
        )
        .unwrap();

        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(RagError::MissingApiKey(_))));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector_without_request() {
        let embedder = GeminiEmbedding::new(
            None,
            DEFAULT_GEMINI_EMBEDDING_MODEL.to_string(),
            768,
            Duration::from_secs(5),
        )
        .unwrap();

        let v = embedder.embed("   ").await.unwrap();
        assert_eq!(v.len(), 768);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_request_serialization() {
        let embedder = embedder(768).unwrap();
        let request = embedder.request_for("hi", TASK_QUERY);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "models/gemini-embedding-001");
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "hi");
    }
}
