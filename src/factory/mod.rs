//! 팩토리 - 설정의 `type` 문자열로 백엔드 선택
//!
//! 역할마다 닫힌 열거형이 있고, 모르는 `type`은 어떤 백엔드도 만들기 전에
//! `UnsupportedBackend`로 거부합니다. 팩토리는 `Arc<dyn Trait>`를 돌려주므로
//! 호출자는 구현 타입을 알 필요가 없습니다.
//!
//! API 키가 없어도 생성은 성공합니다. 실제 호출 시점에 `MissingApiKey`가 납니다.

mod embedding;
mod llm;
mod vectorstore;

pub use embedding::{create_embedder, EmbeddingKind};
pub use llm::{create_llm, LlmKind};
pub use vectorstore::{create_vector_store, VectorStoreKind};

use crate::config::Config;
use crate::embedding::{has_api_key, ApiProvider};
use crate::error::Result;

/// `type` 문자열 정규화 (앞뒤 공백 제거, 소문자)
fn normalize_kind(kind: &str) -> String {
    kind.trim().to_lowercase()
}

/// 설정된 백엔드에 필요한 API 키 중 환경에 없는 것들
///
/// 대화형 모드 시작 시 경고용입니다. 설정 자체가 잘못되었으면 에러를 돌려줍니다.
pub fn missing_credentials(config: &Config) -> Result<Vec<ApiProvider>> {
    let llm = LlmKind::parse(config.llm.kind.as_deref())?;
    let embedding = EmbeddingKind::parse(config.embedding.kind.as_deref())?;

    let mut required: Vec<ApiProvider> = Vec::new();
    for provider in [llm.api_provider(), embedding.api_provider()].into_iter().flatten() {
        if !required.contains(&provider) {
            required.push(provider);
        }
    }

    Ok(required.into_iter().filter(|p| !has_api_key(*p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_kind() {
        assert_eq!(normalize_kind("  OpenAI "), "openai");
    }

    #[test]
    fn test_missing_credentials_hash_embedding_needs_nothing() {
        let config = Config::from_yaml_str("llm:\n  type: openai\nembedding:\n  type: hash\n").unwrap();
        let missing = missing_credentials(&config).unwrap();
        assert!(missing.iter().all(|p| *p == ApiProvider::OpenAi));
    }

    #[test]
    fn test_missing_credentials_rejects_unknown_type() {
        let config = Config::from_yaml_str("llm:\n  type: huggingface\n").unwrap();
        assert!(missing_credentials(&config).is_err());
    }
}
