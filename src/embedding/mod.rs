//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 임베딩 프로바이더들입니다.
//! - [`OpenAiEmbedding`]: OpenAI `/v1/embeddings` (배치 지원)
//! - [`GeminiEmbedding`]: Gemini `embedContent` / `batchEmbedContents`
//! - [`HashEmbedding`]: 네트워크 없이 동작하는 토큰 해싱 임베딩 (오프라인/테스트용)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HashEmbedding::new(384)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod hash;
mod http;
mod openai;

use async_trait::async_trait;

use crate::error::Result;

pub use gemini::{GeminiEmbedding, DEFAULT_GEMINI_DIMENSION, DEFAULT_GEMINI_EMBEDDING_MODEL};
pub use hash::{HashEmbedding, DEFAULT_HASH_DIMENSION};
pub use http::RateLimiter;
pub use openai::{
    OpenAiEmbedding, DEFAULT_OPENAI_EMBEDDING_MODEL, DEFAULT_OPENAI_LARGE_EMBEDDING_MODEL,
};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다. 한 컬렉션 안의 모든 벡터는
/// 같은 프로바이더(같은 차원)로 만들어져야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩 (문서용)
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 검색 쿼리 임베딩 (문서/쿼리 태스크를 구분하는 프로바이더용)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키를 사용하는 외부 서비스
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiProvider {
    OpenAi,
    Gemini,
}

impl ApiProvider {
    /// 확인할 환경변수 (우선순위 순)
    pub fn env_vars(&self) -> &'static [&'static str] {
        match self {
            ApiProvider::OpenAi => &["OPENAI_API_KEY"],
            ApiProvider::Gemini => &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"],
        }
    }
}

/// API 키 로드 (환경변수에서)
///
/// 키가 없어도 에러가 아닙니다. 백엔드는 실제 호출 시점에
/// `MissingApiKey`로 실패합니다.
pub fn get_api_key(provider: ApiProvider) -> Option<String> {
    for var in provider.env_vars() {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Some(key);
            }
        }
    }
    None
}

/// API 키 존재 여부 확인
pub fn has_api_key(provider: ApiProvider) -> bool {
    get_api_key(provider).is_some()
}

/// 빈 텍스트를 제외한 (원래 인덱스, 텍스트) 목록
///
/// 빈 입력을 거부하는 API에 보내기 전에 사용하고, 결과는 [`scatter_embeddings`]로
/// 원래 순서에 되돌립니다.
pub(crate) fn non_empty_inputs(texts: &[String]) -> (Vec<usize>, Vec<String>) {
    texts
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.trim().is_empty())
        .map(|(i, t)| (i, t.clone()))
        .unzip()
}

/// 빈 텍스트 자리는 0 벡터로 채워 원래 순서 복원
pub(crate) fn scatter_embeddings(
    total: usize,
    dimension: usize,
    indices: &[usize],
    vectors: Vec<Vec<f32>>,
) -> Vec<Vec<f32>> {
    let mut out = vec![vec![0.0; dimension]; total];
    for (idx, vector) in indices.iter().zip(vectors) {
        out[*idx] = vector;
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_priority() {
        assert_eq!(
            ApiProvider::Gemini.env_vars(),
            &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        );
        assert_eq!(ApiProvider::OpenAi.env_vars(), &["OPENAI_API_KEY"]);
    }

    #[test]
    fn test_non_empty_roundtrip_keeps_order() {
        let texts = vec![
            "a".to_string(),
            "  ".to_string(),
            "b".to_string(),
            String::new(),
        ];
        let (indices, inputs) = non_empty_inputs(&texts);
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(inputs, vec!["a".to_string(), "b".to_string()]);

        let out = scatter_embeddings(4, 2, &indices, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
        assert_eq!(out[0], vec![1.0, 1.0]);
        assert_eq!(out[1], vec![0.0, 0.0]);
        assert_eq!(out[2], vec![2.0, 2.0]);
        assert_eq!(out[3], vec![0.0, 0.0]);
    }
}
