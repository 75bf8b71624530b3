//! 에러 타입
//!
//! 파이프라인 전체에서 사용하는 단일 에러 열거형입니다.
//! 프론트엔드가 "인덱스 없음" / "백엔드 장애" / "잘못된 입력"을 구분할 수 있도록
//! [`ErrorCategory`]로 분류합니다.

use std::path::PathBuf;

/// 라이브러리 공통 Result
pub type Result<T> = std::result::Result<T, RagError>;

/// 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 설정 오류 (치명적, 재시도 불가)
    Configuration,
    /// 입력 오류 (경로, 파일 형식)
    Input,
    /// 백엔드 호출 오류 (임베딩/생성 API, 벡터 저장소)
    Backend,
    /// 상태 오류 (인덱스 없음, 준비 안 됨)
    State,
}

/// 백엔드 역할 (팩토리 에러 메시지용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    Llm,
    Embedding,
    VectorStore,
}

impl std::fmt::Display for BackendRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendRole::Llm => write!(f, "LLM"),
            BackendRole::Embedding => write!(f, "embedding"),
            BackendRole::VectorStore => write!(f, "vector store"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    // ---- Configuration ----
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("failed to parse configuration {}: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("unsupported {role} type: '{kind}'")]
    UnsupportedBackend { role: BackendRole, kind: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ---- Input ----
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("file must be a PDF: {}", .0.display())]
    InvalidFormat(PathBuf),

    #[error("path must be a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to extract text from PDF {}: {message}", .path.display())]
    PdfExtract { path: PathBuf, message: String },

    #[error("no text chunks could be extracted from {}", .0.display())]
    NoChunks(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ---- Backend ----
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("API key not set: {0}")]
    MissingApiKey(String),

    #[error("embedding dimension mismatch: index has {expected}, embedder produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store error: {0}")]
    VectorStore(#[from] lancedb::Error),

    #[error("index data is corrupt: {0}")]
    CorruptIndex(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    // ---- State ----
    #[error("pipeline not ready: call index_documents() or load_vectorstore() first")]
    NotReady,

    #[error("vector store not initialized: build or load an index before retrieving")]
    VectorStoreUninitialized,

    #[error("no index found for collection '{collection}' in {}", .path.display())]
    IndexNotFound { path: PathBuf, collection: String },

    #[error("index is locked by another writer: {}", .0.display())]
    IndexLocked(PathBuf),

    #[error("operation cancelled")]
    Cancelled,
}

impl RagError {
    /// 에러 분류
    pub fn category(&self) -> ErrorCategory {
        match self {
            RagError::ConfigNotFound(_)
            | RagError::ConfigParse { .. }
            | RagError::UnsupportedBackend { .. }
            | RagError::InvalidConfig(_) => ErrorCategory::Configuration,

            RagError::NotFound(_)
            | RagError::InvalidFormat(_)
            | RagError::NotADirectory(_)
            | RagError::PdfExtract { .. }
            | RagError::NoChunks(_)
            | RagError::Io { .. } => ErrorCategory::Input,

            RagError::Embedding(_)
            | RagError::Generation(_)
            | RagError::Timeout { .. }
            | RagError::MissingApiKey(_)
            | RagError::DimensionMismatch { .. }
            | RagError::VectorStore(_)
            | RagError::CorruptIndex(_)
            | RagError::Arrow(_) => ErrorCategory::Backend,

            RagError::NotReady
            | RagError::VectorStoreUninitialized
            | RagError::IndexNotFound { .. }
            | RagError::IndexLocked(_)
            | RagError::Cancelled => ErrorCategory::State,
        }
    }

    /// 호출자가 재시도해도 되는 에러인지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Timeout { .. } | RagError::IndexLocked(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io {
            path: path.into(),
            source,
        }
    }
}

/// reqwest 에러 변환 (타임아웃은 재시도 가능한 별도 종류로)
pub(crate) fn from_request_error(
    err: reqwest::Error,
    operation: &str,
    wrap: fn(String) -> RagError,
) -> RagError {
    if err.is_timeout() {
        RagError::Timeout {
            operation: operation.to_string(),
        }
    } else {
        wrap(format!("{}: {}", operation, err))
    }
}
