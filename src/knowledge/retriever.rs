//! Retriever - 설정된 top_k / 검색 방식으로 벡터 저장소 조회

use std::sync::Arc;

use super::vector::{RetrievedChunk, SearchType, VectorStore};
use crate::config::RetrievalConfig;
use crate::error::{RagError, Result};

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 4;

/// 검색기
///
/// 저장소를 읽기만 하며 인덱스를 바꾸지 않습니다.
#[derive(Clone)]
pub struct Retriever {
    store: Option<Arc<dyn VectorStore>>,
    top_k: usize,
    search_type: SearchType,
    score_threshold: Option<f32>,
}

impl Retriever {
    /// 설정으로 검색기 생성
    ///
    /// # Arguments
    /// * `store` - 벡터 저장소 (없으면 검색 시 `VectorStoreUninitialized`)
    /// * `config` - retrieval 설정 섹션
    pub fn new(store: Option<Arc<dyn VectorStore>>, config: &RetrievalConfig) -> Result<Self> {
        let top_k = config.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }

        let search_type = SearchType::from_config(
            config.search_type.as_deref(),
            config.fetch_k,
            config.lambda_mult,
        )?;

        Ok(Self {
            store,
            top_k,
            search_type,
            score_threshold: config.score_threshold,
        })
    }

    /// 질문과 관련된 청크 검색
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let store = self
            .store
            .as_ref()
            .ok_or(RagError::VectorStoreUninitialized)?;

        let results = store
            .similarity_search(query, self.top_k, self.search_type)
            .await?;

        tracing::info!(
            "Retrieved {} chunk(s) from '{}'",
            results.len(),
            store.collection_name()
        );
        Ok(results)
    }

    /// 답변 생성에 충분히 관련된 결과인지 판단
    ///
    /// 임계값이 없으면 항상 true. 있으면 최고 점수가 임계값 이상이어야 합니다.
    pub fn is_confident(&self, results: &[RetrievedChunk]) -> bool {
        let Some(threshold) = self.score_threshold else {
            return true;
        };

        results
            .iter()
            .map(|r| r.score)
            .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))))
            .map(|best| best >= threshold)
            .unwrap_or(false)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }
}
