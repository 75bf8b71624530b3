//! Text Chunking Module
//!
//! 재귀 경계 분할: 굵은 구분자(문단)부터 시도하고, 여전히 긴 조각은
//! 더 가는 구분자(줄, 문장, 단어, 문자)로 다시 나눕니다.
//!
//! - 길이는 바이트가 아닌 문자 수로 셉니다.
//! - 구분자는 앞 조각의 끝에 붙여 둡니다.
//! - 이어지는 청크는 최대 `chunk_overlap` 문자를 공유합니다.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::loader::{Document, DocumentMetadata};

/// 기본 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// 기본 오버랩 (문자 수)
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// 구분자 (굵은 것부터). 마지막 빈 문자열은 문자 단위 분할
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

// ============================================================================
// Chunk
// ============================================================================

/// 청크 메타데이터 (페이지 메타데이터 + 페이지 내 순번)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// 페이지 내 청크 인덱스 (0-based)
    pub chunk_index: usize,
}

/// 텍스트 청크
#[derive(Debug, Clone)]
pub struct Chunk {
    /// `{source}:{page}:{chunk_index}`
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    fn new(text: String, document: DocumentMetadata, chunk_index: usize) -> Self {
        let id = format!("{}:{}:{}", document.source, document.page, chunk_index);
        Self {
            id,
            text,
            metadata: ChunkMetadata {
                document,
                chunk_index,
            },
        }
    }
}

// ============================================================================
// RecursiveSplitter
// ============================================================================

/// 재귀 문자 분할기
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    /// 분할기 생성
    ///
    /// # Arguments
    /// * `chunk_size` - 청크 최대 문자 수 (> 0)
    /// * `chunk_overlap` - 이웃 청크 공유 문자 수 (< chunk_size)
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// 텍스트를 청크 문자열로 분할
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        if char_len(text) <= self.chunk_size {
            return vec![text.trim().to_string()];
        }

        self.split_recursive(text, &SEPARATORS)
    }

    /// 페이지 문서들을 청크로 분할 (페이지마다 chunk_index는 0부터)
    pub fn split_documents<I>(&self, documents: I) -> Vec<Chunk>
    where
        I: IntoIterator<Item = Document>,
    {
        documents
            .into_iter()
            .flat_map(|doc| {
                self.split_text(&doc.text)
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| Chunk::new(text, doc.metadata.clone(), i))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // 텍스트에 등장하는 첫 구분자 선택
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, &sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                finer = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keep_end(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending));
        }

        chunks
    }

    /// 짧은 조각들을 chunk_size까지 이어 붙이고, 청크를 낼 때마다
    /// 꼬리 조각을 chunk_overlap 이하로 남겨 다음 청크로 넘김
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                let joined: String = current.iter().copied().collect();
                push_trimmed(&mut chunks, &joined);

                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        let joined: String = current.iter().copied().collect();
        push_trimmed(&mut chunks, &joined);

        chunks
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// 구분자를 앞 조각의 끝에 남긴 채 분할. 빈 구분자는 문자 단위
fn split_keep_end<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, sep) in text.match_indices(separator) {
        let end = idx + sep.len();
        if end > start {
            pieces.push(&text[start..end]);
        }
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn page(source: &str, page: usize, text: &str) -> Document {
        Document {
            text: text.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                page,
                total_pages: 3,
            },
        }
    }

    /// 두 문자열이 공유하는 가장 긴 접미사/접두사 (문자 수)
    fn shared_overlap(prev: &str, next: &str) -> usize {
        let prev: Vec<char> = prev.chars().collect();
        let next: Vec<char> = next.chars().collect();
        (1..=prev.len().min(next.len()))
            .rev()
            .find(|&n| prev[prev.len() - n..] == next[..n])
            .unwrap_or(0)
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            RecursiveSplitter::new(0, 0),
            Err(RagError::InvalidConfig(_))
        ));
        assert!(matches!(
            RecursiveSplitter::new(100, 100),
            Err(RagError::InvalidConfig(_))
        ));
        assert!(RecursiveSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_input() {
        let splitter = RecursiveSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("  \n\n \t").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = RecursiveSplitter::new(50, 10).unwrap();
        let chunks = splitter.split_text("  Short paragraph.\n\nAnother one.  ");
        assert_eq!(chunks, vec!["Short paragraph.\n\nAnother one.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = RecursiveSplitter::new(40, 10).unwrap();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20)
            + "\n\n"
            + &"Lorem ipsum dolor sit amet consectetur. ".repeat(15);

        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "too long: {:?}", chunk);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn test_character_fallback_for_unbroken_text() {
        let splitter = RecursiveSplitter::new(10, 3).unwrap();
        let text = "a".repeat(35);
        let chunks = splitter.split_text(&text);

        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks[0], "a".repeat(10));
        // 이어지는 청크는 정확히 오버랩만큼 공유
        assert_eq!(chunks[1], "a".repeat(10));
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn test_overlap_is_bounded() {
        let splitter = RecursiveSplitter::new(30, 8).unwrap();
        let words: Vec<String> = (0..60).map(|i| format!("w{:02}", i)).collect();
        let text = words.join(" ");

        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let shared = shared_overlap(&pair[0], &pair[1]);
            assert!(shared <= 8, "overlap {} in {:?}", shared, pair);
        }
        // 오버랩이 실제로 존재
        assert!(chunks[0].ends_with("w05 w06"));
        assert!(chunks[1].starts_with("w05 w06"));
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let splitter = RecursiveSplitter::new(5, 0).unwrap();
        let chunks = splitter.split_text("가나다라마바사아자차");
        assert_eq!(chunks, vec!["가나다라마".to_string(), "바사아자차".to_string()]);
    }

    #[test]
    fn test_split_is_deterministic() {
        let splitter = RecursiveSplitter::new(64, 16).unwrap();
        let text = "First paragraph line one.\nLine two here.\n\nSecond paragraph. With sentences. ".repeat(5);
        assert_eq!(splitter.split_text(&text), splitter.split_text(&text));
    }

    #[test]
    fn test_split_keep_end() {
        assert_eq!(split_keep_end("a. b. c", ". "), vec!["a. ", "b. ", "c"]);
        assert_eq!(split_keep_end("ab", ""), vec!["a", "b"]);
        assert_eq!(split_keep_end("\n\nx", "\n\n"), vec!["\n\n", "x"]);
    }

    #[test]
    fn test_split_documents_metadata() {
        let splitter = RecursiveSplitter::new(20, 0).unwrap();
        let docs = vec![
            page("docs/a.pdf", 1, "alpha beta gamma delta epsilon zeta"),
            page("docs/a.pdf", 2, "short"),
            page("docs/a.pdf", 3, "   "),
        ];

        let chunks = splitter.split_documents(docs);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].id, "docs/a.pdf:1:0");
        assert_eq!(chunks[1].id, "docs/a.pdf:1:1");
        assert_eq!(chunks[1].metadata.chunk_index, 1);
        assert_eq!(chunks[2].id, "docs/a.pdf:2:0");
        assert_eq!(chunks[2].metadata.document.page, 2);
    }

    #[test]
    fn test_chunk_metadata_serializes_flat() {
        let meta = ChunkMetadata {
            document: DocumentMetadata {
                source: "a.pdf".to_string(),
                page: 2,
                total_pages: 3,
            },
            chunk_index: 1,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["source"], "a.pdf");
        assert_eq!(json["page"], 2);
        assert_eq!(json["chunk_index"], 1);

        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
