//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 저장소 구현과 무관한 순위 계산(코사인 정렬, MMR 재정렬)을 함께 둡니다.

use std::cmp::Ordering;

use async_trait::async_trait;

use super::chunker::ChunkMetadata;
use crate::error::{RagError, Result};

/// MMR 후보 수 기본값
pub const DEFAULT_FETCH_K: usize = 20;

/// MMR 람다 기본값 (관련성/다양성 균형)
pub const DEFAULT_LAMBDA_MULT: f32 = 0.5;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// 청크 ID
    pub chunk_id: String,
    /// 청크 텍스트
    pub text: String,
    /// 출처 메타데이터
    pub metadata: ChunkMetadata,
    /// 코사인 유사도 (높을수록 관련)
    pub score: f32,
}

/// 검색 방식
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchType {
    /// 유사도 상위 k개
    Similarity,
    /// 상위 fetch_k개를 MMR로 재정렬
    Mmr { fetch_k: usize, lambda: f32 },
}

impl SearchType {
    /// 설정 문자열에서 검색 방식 결정
    ///
    /// # Arguments
    /// * `name` - `similarity` 또는 `mmr` (없으면 similarity)
    /// * `fetch_k` - MMR 후보 수
    /// * `lambda` - MMR 람다 (0.0 ~ 1.0)
    pub fn from_config(name: Option<&str>, fetch_k: Option<usize>, lambda: Option<f32>) -> Result<Self> {
        match name.map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("similarity") => Ok(SearchType::Similarity),
            Some("mmr") => {
                let lambda = lambda.unwrap_or(DEFAULT_LAMBDA_MULT);
                if !(0.0..=1.0).contains(&lambda) {
                    return Err(RagError::InvalidConfig(format!(
                        "lambda_mult must be between 0.0 and 1.0, got {}",
                        lambda
                    )));
                }
                Ok(SearchType::Mmr {
                    fetch_k: fetch_k.unwrap_or(DEFAULT_FETCH_K),
                    lambda,
                })
            }
            Some(other) => Err(RagError::InvalidConfig(format!(
                "unknown search_type '{}' (expected 'similarity' or 'mmr')",
                other
            ))),
        }
    }
}

/// 순위 계산용 저장 레코드
#[derive(Debug, Clone)]
pub struct StoredVector {
    /// 삽입 순서 (동점 처리용)
    pub seq: i64,
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 질문과 유사한 청크 검색 (점수 내림차순)
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        search_type: SearchType,
    ) -> Result<Vec<RetrievedChunk>>;

    /// 저장된 청크 수
    async fn count(&self) -> Result<usize>;

    /// 벡터 차원
    fn dimension(&self) -> usize;

    /// 컬렉션 이름
    fn collection_name(&self) -> &str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위입니다.
///
/// # Arguments
/// * `a` - 첫 번째 벡터
/// * `b` - 두 번째 벡터
///
/// # Returns
/// 코사인 유사도 (-1.0 ~ 1.0)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 저장 레코드를 질의 벡터 기준으로 순위화
///
/// 점수 내림차순, 동점이면 삽입 순서 오름차순입니다.
pub fn rank_records(
    query: &[f32],
    records: Vec<StoredVector>,
    top_k: usize,
    search_type: SearchType,
) -> Vec<RetrievedChunk> {
    if top_k == 0 || records.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f32, StoredVector)> = records
        .into_iter()
        .map(|r| (cosine_similarity(query, &r.vector), r))
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.seq.cmp(&b.seq))
    });

    let selected: Vec<(f32, StoredVector)> = match search_type {
        SearchType::Similarity => scored.into_iter().take(top_k).collect(),
        SearchType::Mmr { fetch_k, lambda } => {
            scored.truncate(fetch_k.max(top_k));
            mmr_rerank(scored, top_k, lambda)
        }
    };

    selected
        .into_iter()
        .map(|(score, r)| RetrievedChunk {
            chunk_id: r.chunk_id,
            text: r.text,
            metadata: r.metadata,
            score,
        })
        .collect()
}

/// MMR 재정렬
///
/// MMR = λ × relevance - (1-λ) × max(similarity(doc, selected))
///
/// # Arguments
/// * `candidates` - (관련성 점수, 레코드), 관련성 내림차순
/// * `k` - 선택할 개수
/// * `lambda` - 1.0 = 관련성만, 0.0 = 다양성만
///
/// # Returns
/// 선택 순서대로, 원래 관련성 점수 유지
fn mmr_rerank(candidates: Vec<(f32, StoredVector)>, k: usize, lambda: f32) -> Vec<(f32, StoredVector)> {
    let k = k.min(candidates.len());
    let mut selected: Vec<(f32, StoredVector)> = Vec::with_capacity(k);
    let mut remaining = candidates;

    for _ in 0..k {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, (relevance, candidate)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|(_, s)| cosine_similarity(&candidate.vector, &s.vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let mmr = lambda * relevance - (1.0 - lambda) * redundancy;
            // 엄격한 비교: 동점이면 앞선(더 관련 있는) 후보 유지
            if mmr > best_mmr {
                best_mmr = mmr;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}

// ============================================================================
// Tests
// ============================================================================
