//! 임베딩 팩토리

use std::sync::Arc;
use std::time::Duration;

use super::normalize_kind;
use crate::config::EmbeddingConfig;
use crate::embedding::{
    get_api_key, ApiProvider, EmbeddingProvider, GeminiEmbedding, HashEmbedding, OpenAiEmbedding,
    DEFAULT_GEMINI_DIMENSION, DEFAULT_GEMINI_EMBEDDING_MODEL, DEFAULT_HASH_DIMENSION,
    DEFAULT_OPENAI_EMBEDDING_MODEL, DEFAULT_OPENAI_LARGE_EMBEDDING_MODEL,
};
use crate::error::{BackendRole, RagError, Result};

/// 임베딩 요청 타임아웃 기본값 (초)
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;

/// 지원하는 임베딩 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    /// text-embedding-3-small
    OpenAi,
    /// text-embedding-3-large
    OpenAiLarge,
    Gemini,
    /// 오프라인 해싱 임베더 (API 키 불필요)
    Hash,
}

impl EmbeddingKind {
    /// `type` 문자열 해석 (없으면 openai)
    pub fn parse(kind: Option<&str>) -> Result<Self> {
        let Some(kind) = kind else {
            return Ok(EmbeddingKind::OpenAi);
        };

        match normalize_kind(kind).as_str() {
            "openai" => Ok(EmbeddingKind::OpenAi),
            "openai-large" => Ok(EmbeddingKind::OpenAiLarge),
            "gemini" | "google" => Ok(EmbeddingKind::Gemini),
            "hash" => Ok(EmbeddingKind::Hash),
            _ => Err(RagError::UnsupportedBackend {
                role: BackendRole::Embedding,
                kind: kind.to_string(),
            }),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            EmbeddingKind::OpenAi => DEFAULT_OPENAI_EMBEDDING_MODEL,
            EmbeddingKind::OpenAiLarge => DEFAULT_OPENAI_LARGE_EMBEDDING_MODEL,
            EmbeddingKind::Gemini => DEFAULT_GEMINI_EMBEDDING_MODEL,
            EmbeddingKind::Hash => "hash",
        }
    }

    pub fn api_provider(&self) -> Option<ApiProvider> {
        match self {
            EmbeddingKind::OpenAi | EmbeddingKind::OpenAiLarge => Some(ApiProvider::OpenAi),
            EmbeddingKind::Gemini => Some(ApiProvider::Gemini),
            EmbeddingKind::Hash => None,
        }
    }
}

/// 설정으로 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let kind = EmbeddingKind::parse(config.kind.as_deref())?;

    let model = config
        .model_name
        .clone()
        .unwrap_or_else(|| kind.default_model().to_string());
    let timeout = Duration::from_secs(
        config
            .timeout_secs
            .unwrap_or(DEFAULT_EMBEDDING_TIMEOUT_SECS),
    );
    let max_retries = config.max_retries.unwrap_or(0);

    let embedder: Arc<dyn EmbeddingProvider> = match kind {
        EmbeddingKind::OpenAi | EmbeddingKind::OpenAiLarge => {
            let mut embedding = OpenAiEmbedding::new(
                get_api_key(ApiProvider::OpenAi),
                model,
                config.dimension,
                timeout,
            )?
            .with_max_retries(max_retries);
            if let Some(url) = &config.base_url {
                embedding = embedding.with_base_url(url.clone());
            }
            if config.requests_per_minute.is_some() {
                tracing::warn!("embedding.requests_per_minute is only applied to Gemini embeddings");
            }
            Arc::new(embedding)
        }
        EmbeddingKind::Gemini => {
            let mut embedding = GeminiEmbedding::new(
                get_api_key(ApiProvider::Gemini),
                model,
                config.dimension.unwrap_or(DEFAULT_GEMINI_DIMENSION),
                timeout,
            )?
            .with_max_retries(max_retries);
            if let Some(url) = &config.base_url {
                embedding = embedding.with_base_url(url.clone());
            }
            if let Some(rpm) = config.requests_per_minute {
                embedding = embedding.with_requests_per_minute(rpm);
            }
            Arc::new(embedding)
        }
        EmbeddingKind::Hash => Arc::new(HashEmbedding::new(
            config.dimension.unwrap_or(DEFAULT_HASH_DIMENSION),
        )?),
    };

    tracing::info!(
        "Using {:?} embeddings '{}' ({} dimensions)",
        kind,
        embedder.name(),
        embedder.dimension()
    );

    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(EmbeddingKind::parse(None).unwrap(), EmbeddingKind::OpenAi);
        assert_eq!(
            EmbeddingKind::parse(Some("OPENAI-LARGE")).unwrap(),
            EmbeddingKind::OpenAiLarge
        );
        assert_eq!(EmbeddingKind::parse(Some("hash")).unwrap(), EmbeddingKind::Hash);

        let err = EmbeddingKind::parse(Some("huggingface")).unwrap_err();
        assert!(matches!(
            err,
            RagError::UnsupportedBackend { role: BackendRole::Embedding, .. }
        ));
    }

    #[test]
    fn test_default_dimensions() {
        let small = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(small.dimension(), 1536);

        let large = create_embedder(&EmbeddingConfig {
            kind: Some("openai-large".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(large.dimension(), 3072);

        let hash = create_embedder(&EmbeddingConfig {
            kind: Some("hash".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(hash.dimension(), DEFAULT_HASH_DIMENSION);
        assert_eq!(hash.name(), "hash");
    }

    #[test]
    fn test_invalid_gemini_dimension() {
        let result = create_embedder(&EmbeddingConfig {
            kind: Some("gemini".to_string()),
            dimension: Some(100),
            ..Default::default()
        });
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }
}
