//! 토큰 해싱 임베딩 (오프라인)
//!
//! 소문자화한 단어 토큰을 SHA-256으로 해싱해 고정 차원 벡터의 한 칸에 ±1을 더하고
//! L2 정규화합니다. 의미 유사도는 없지만 같은 단어를 공유하는 텍스트끼리
//! 코사인 유사도가 높아지므로, API 키 없이 파이프라인을 돌리거나 테스트할 때 씁니다.
//! 결과는 실행/플랫폼과 무관하게 결정적입니다.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 기본 차원
pub const DEFAULT_HASH_DIMENSION: usize = 384;

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid token regex"))
}

/// 해싱 임베딩 구현체
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    /// 동기 임베딩 (네트워크 없음)
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in token_regex().find_iter(text) {
            let token = token.as_str().to_lowercase();
            let digest = Sha256::digest(token.as_bytes());

            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashEmbedding::new(64).unwrap();
        let a = embedder.embed_text("The quick brown fox");
        let b = embedder.embed_text("the QUICK brown fox!");
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashEmbedding::new(DEFAULT_HASH_DIMENSION).unwrap();
        let query = embedder.embed_text("lighthouse keeper schedule");
        let related = embedder.embed_text("The lighthouse keeper follows a strict schedule.");
        let unrelated = embedder.embed_text("Bananas are rich in potassium.");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedding::new(16).unwrap();
        assert!(embedder.embed_text("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashEmbedding::new(0).is_err());
    }
}
