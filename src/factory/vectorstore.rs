//! 벡터 저장소 팩토리
//!
//! 청크가 있으면 빌드 모드(임베딩 후 저장), 비어 있으면 로드 모드(기존 인덱스 열기).

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::normalize_kind;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{BackendRole, RagError, Result};
use crate::knowledge::{
    Chunk, IngestOptions, LanceVectorStore, VectorStore, DEFAULT_BATCH_SIZE,
    DEFAULT_COLLECTION_NAME, DEFAULT_CONCURRENCY, DEFAULT_PERSIST_DIRECTORY,
};

/// 지원하는 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStoreKind {
    LanceDb,
}

impl VectorStoreKind {
    /// `type` 문자열 해석 (없으면 lancedb)
    pub fn parse(kind: Option<&str>) -> Result<Self> {
        let Some(kind) = kind else {
            return Ok(VectorStoreKind::LanceDb);
        };

        match normalize_kind(kind).as_str() {
            "lancedb" | "lance" => Ok(VectorStoreKind::LanceDb),
            _ => Err(RagError::UnsupportedBackend {
                role: BackendRole::VectorStore,
                kind: kind.to_string(),
            }),
        }
    }
}

/// 설정된 저장 경로
pub(crate) fn persist_directory(config: &Config) -> PathBuf {
    config
        .vectorstore
        .persist_directory
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PERSIST_DIRECTORY))
}

/// 설정된 컬렉션 이름
pub(crate) fn collection_name(config: &Config) -> String {
    config
        .vectorstore
        .collection_name
        .clone()
        .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string())
}

/// 벡터 저장소 생성 (빌드 또는 로드)
///
/// # Arguments
/// * `config` - 전체 설정 (vectorstore + embedding 배치 옵션)
/// * `chunks` - 빌드할 청크, 비어 있으면 로드 모드
/// * `embedder` - 임베딩 프로바이더
/// * `cancel` - 빌드 취소 토큰
pub async fn create_vector_store(
    config: &Config,
    chunks: &[Chunk],
    embedder: Arc<dyn EmbeddingProvider>,
    cancel: &CancellationToken,
) -> Result<Arc<dyn VectorStore>> {
    let kind = VectorStoreKind::parse(config.vectorstore.kind.as_deref())?;
    let persist_dir = persist_directory(config);
    let collection = collection_name(config);

    let store = match kind {
        VectorStoreKind::LanceDb if chunks.is_empty() => {
            LanceVectorStore::open_existing(&persist_dir, embedder, &collection).await?
        }
        VectorStoreKind::LanceDb => {
            let options = IngestOptions {
                batch_size: config.embedding.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
                concurrency: config.embedding.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            };
            LanceVectorStore::create_from_documents(
                chunks,
                embedder,
                &persist_dir,
                &collection,
                options,
                cancel,
            )
            .await?
        }
    };

    Ok(Arc::new(store))
}
