//! LLM 팩토리

use std::sync::Arc;
use std::time::Duration;

use super::normalize_kind;
use crate::config::LlmConfig;
use crate::embedding::{get_api_key, ApiProvider};
use crate::error::{BackendRole, RagError, Result};
use crate::llm::{
    GeminiChat, GenerationParams, LlmProvider, OpenAiChat, DEFAULT_GEMINI_MODEL,
    DEFAULT_MAX_TOKENS, DEFAULT_OPENAI_MODEL, DEFAULT_TEMPERATURE,
};

/// LLM 요청 타임아웃 기본값 (초)
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// 지원하는 LLM 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmKind {
    OpenAi,
    Gemini,
}

impl LlmKind {
    /// `type` 문자열 해석 (없으면 openai)
    pub fn parse(kind: Option<&str>) -> Result<Self> {
        let Some(kind) = kind else {
            return Ok(LlmKind::OpenAi);
        };

        match normalize_kind(kind).as_str() {
            "openai" => Ok(LlmKind::OpenAi),
            "gemini" | "google" => Ok(LlmKind::Gemini),
            _ => Err(RagError::UnsupportedBackend {
                role: BackendRole::Llm,
                kind: kind.to_string(),
            }),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmKind::OpenAi => DEFAULT_OPENAI_MODEL,
            LlmKind::Gemini => DEFAULT_GEMINI_MODEL,
        }
    }

    pub fn api_provider(&self) -> Option<ApiProvider> {
        match self {
            LlmKind::OpenAi => Some(ApiProvider::OpenAi),
            LlmKind::Gemini => Some(ApiProvider::Gemini),
        }
    }
}

/// 설정으로 LLM 생성
pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let kind = LlmKind::parse(config.kind.as_deref())?;

    let model = config
        .model_name
        .clone()
        .unwrap_or_else(|| kind.default_model().to_string());
    let params = GenerationParams {
        temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    };
    if !(0.0..=2.0).contains(&params.temperature) {
        return Err(RagError::InvalidConfig(format!(
            "llm.temperature must be between 0.0 and 2.0, got {}",
            params.temperature
        )));
    }
    let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS));

    tracing::info!("Using {:?} LLM '{}'", kind, model);

    let llm: Arc<dyn LlmProvider> = match kind {
        LlmKind::OpenAi => {
            let mut chat = OpenAiChat::new(get_api_key(ApiProvider::OpenAi), model, params, timeout)?;
            if let Some(url) = &config.base_url {
                chat = chat.with_base_url(url.clone());
            }
            Arc::new(chat)
        }
        LlmKind::Gemini => {
            let mut chat = GeminiChat::new(get_api_key(ApiProvider::Gemini), model, params, timeout)?;
            if let Some(url) = &config.base_url {
                chat = chat.with_base_url(url.clone());
            }
            Arc::new(chat)
        }
    };

    Ok(llm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(LlmKind::parse(None).unwrap(), LlmKind::OpenAi);
        assert_eq!(LlmKind::parse(Some("OpenAI")).unwrap(), LlmKind::OpenAi);
        assert_eq!(LlmKind::parse(Some("google")).unwrap(), LlmKind::Gemini);

        let err = LlmKind::parse(Some("huggingface")).unwrap_err();
        assert!(matches!(
            err,
            RagError::UnsupportedBackend { role: BackendRole::Llm, ref kind } if kind == "huggingface"
        ));
    }

    #[test]
    fn test_create_uses_defaults() {
        let llm = create_llm(&LlmConfig::default()).unwrap();
        assert_eq!(llm.model_name(), DEFAULT_OPENAI_MODEL);

        let gemini = create_llm(&LlmConfig {
            kind: Some("gemini".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(gemini.model_name(), DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_invalid_temperature() {
        let result = create_llm(&LlmConfig {
            temperature: Some(3.5),
            ..Default::default()
        });
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }
}
