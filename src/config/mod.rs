//! 설정 모듈 - YAML 설정 파일 로드
//!
//! 프로세스 시작 시 한 번 로드하고, 이후에는 읽기 전용으로 각 컴포넌트 생성자에
//! 참조로 전달합니다. 전역 상태는 없습니다.
//!
//! ## 형식
//! ```yaml
//! llm:
//!   type: openai
//!   model_name: gpt-4o-mini
//!   temperature: 0.7
//!   max_tokens: 500
//! embedding:
//!   type: openai
//!   model_name: text-embedding-3-small
//! vectorstore:
//!   type: lancedb
//!   persist_directory: ./indexes/lancedb
//!   collection_name: rag_documents
//! document_processing:
//!   chunk_size: 1000
//!   chunk_overlap: 200
//! retrieval:
//!   top_k: 4
//!   search_type: similarity
//! ```
//!
//! 모든 섹션과 필드는 생략 가능합니다. 생략된 섹션은 빈 매핑으로 취급되며,
//! 기본값은 각 소비자(팩토리, 스플리터, 리트리버)가 적용합니다.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RagError, Result};

/// 기본 설정 파일 경로
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

// ============================================================================
// Config
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vectorstore: VectorStoreConfig,
    pub document_processing: DocumentProcessingConfig,
    pub retrieval: RetrievalConfig,
}

/// `llm` 섹션
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub model_name: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `embedding` 섹션
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub model_name: Option<String>,
    pub dimension: Option<usize>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub base_url: Option<String>,
    pub requests_per_minute: Option<u32>,
}

/// `vectorstore` 섹션
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub persist_directory: Option<PathBuf>,
    pub collection_name: Option<String>,
}

/// `document_processing` 섹션
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DocumentProcessingConfig {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

/// `retrieval` 섹션
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: Option<usize>,
    pub search_type: Option<String>,
    /// MMR 후보 개수
    pub fetch_k: Option<usize>,
    /// MMR 관련성/다양성 가중치 (1.0 = 관련성만)
    pub lambda_mult: Option<f32>,
    /// 이 값보다 최고 점수가 낮으면 LLM 호출 없이 "모른다"고 답함
    pub score_threshold: Option<f32>,
}

impl Config {
    /// YAML 파일에서 설정 로드
    ///
    /// # Errors
    /// * `ConfigNotFound` - 파일이 없음
    /// * `ConfigParse` - YAML 문법 오류 또는 필드 타입 불일치
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
        let config = Self::from_yaml_str(&content).map_err(|message| RagError::ConfigParse {
            path: path.to_path_buf(),
            message,
        })?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// YAML 문자열 파싱 (빈 문서는 기본 설정)
    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        // `llm:`처럼 값이 비어 있는 섹션은 null로 파싱되므로 먼저 Value로 읽어 정리
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| e.to_string())?;

        match &mut value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => {
                map.retain(|_, v| !v.is_null());
            }
            _ => return Err("top-level YAML value must be a mapping".to_string()),
        }

        serde_yaml::from_value(value).map_err(|e| e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/definitely/not/here/config.yaml"));
        assert!(matches!(result, Err(RagError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "llm: [unclosed").unwrap();

        let result = Config::load(file.path());
        assert!(matches!(result, Err(RagError::ConfigParse { .. })));
    }

    #[test]
    fn test_wrong_field_type_is_parse_error() {
        let result = Config::from_yaml_str("document_processing:\n  chunk_size: lots\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
llm:
  type: openai
  model_name: gpt-4o-mini
  temperature: 0.2
  max_tokens: 256
embedding:
  type: openai
  model_name: text-embedding-3-small
vectorstore:
  type: lancedb
  persist_directory: ./indexes/test
  collection_name: docs
document_processing:
  chunk_size: 500
  chunk_overlap: 50
retrieval:
  top_k: 3
  search_type: mmr
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.llm.kind.as_deref(), Some("openai"));
        assert_eq!(config.llm.temperature, Some(0.2));
        assert_eq!(config.llm.max_tokens, Some(256));
        assert_eq!(
            config.vectorstore.persist_directory,
            Some(PathBuf::from("./indexes/test"))
        );
        assert_eq!(config.document_processing.chunk_size, Some(500));
        assert_eq!(config.retrieval.search_type.as_deref(), Some("mmr"));
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let config = Config::from_yaml_str("llm:\n  type: gemini\n").unwrap();
        assert_eq!(config.llm.kind.as_deref(), Some("gemini"));
        assert!(config.embedding.kind.is_none());
        assert!(config.retrieval.top_k.is_none());
        assert!(config.document_processing.chunk_size.is_none());
    }

    #[test]
    fn test_empty_and_null_sections() {
        let config = Config::from_yaml_str("").unwrap();
        assert!(config.llm.kind.is_none());

        let config = Config::from_yaml_str("llm:\nretrieval:\n  top_k: 2\n").unwrap();
        assert!(config.llm.kind.is_none());
        assert_eq!(config.retrieval.top_k, Some(2));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = Config::from_yaml_str("llm:\n  type: openai\n  stream: true\nui:\n  theme: dark\n")
            .unwrap();
        assert_eq!(config.llm.kind.as_deref(), Some("openai"));
    }
}
