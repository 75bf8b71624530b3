//! 문서 로더 - PDF 파일/폴더를 페이지 단위 문서로 읽기
//!
//! - [`DocumentLoader::load_single`]: PDF 파일 하나 (즉시 로드)
//! - [`DocumentLoader::load_directory`]: 폴더 바로 아래의 PDF들 (지연 로드, 비재귀)
//!
//! 폴더 로드 중 읽을 수 없는 파일은 경고 후 건너뛰고 나머지를 계속 읽습니다.

pub mod pdf;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{RagError, Result};

/// 지원하는 문서 확장자
const PDF_EXTENSION: &str = "pdf";

// ============================================================================
// Types
// ============================================================================

/// 페이지 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// 원본 파일 경로
    pub source: String,
    /// 페이지 번호 (1부터 시작)
    pub page: usize,
    /// 파일의 총 페이지 수
    pub total_pages: usize,
}

/// 로드된 문서 (PDF 한 페이지)
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// 폴더 로드 중 건너뛴 파일
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

// ============================================================================
// DocumentLoader
// ============================================================================

/// 문서 로더
pub struct DocumentLoader;

impl DocumentLoader {
    /// PDF 파일 하나를 페이지 문서 목록으로 로드
    ///
    /// 존재 여부와 확장자는 파일을 읽기 전에 확인합니다.
    ///
    /// # Errors
    /// * `NotFound` - 경로가 없음
    /// * `InvalidFormat` - 확장자가 `.pdf`가 아님
    /// * `PdfExtract` - 파일이 손상됨
    pub fn load_single(path: &Path) -> Result<Vec<Document>> {
        if !path.exists() {
            return Err(RagError::NotFound(path.to_path_buf()));
        }

        if !is_pdf(path) {
            return Err(RagError::InvalidFormat(path.to_path_buf()));
        }

        load_pdf_pages(path)
    }

    /// 폴더 바로 아래의 PDF 파일들을 파일 이름 순서로 지연 로드
    ///
    /// # Errors
    /// * `NotFound` - 폴더가 없음
    /// * `NotADirectory` - 경로가 폴더가 아님
    pub fn load_directory(path: &Path) -> Result<DirectoryPages> {
        if !path.exists() {
            return Err(RagError::NotFound(path.to_path_buf()));
        }

        if !path.is_dir() {
            return Err(RagError::NotADirectory(path.to_path_buf()));
        }

        let files: VecDeque<PathBuf> = WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e.into_path()),
                Err(e) => {
                    tracing::warn!("Failed to read directory entry in {:?}: {}", path, e);
                    None
                }
            })
            .filter(|p| p.is_file() && is_pdf(p))
            .collect();

        tracing::info!("Found {} PDF file(s) in {:?}", files.len(), path);

        Ok(DirectoryPages {
            files,
            current: Vec::new().into_iter(),
            skipped: Vec::new(),
        })
    }

    /// 파일이면 `load_single`, 폴더면 `load_directory`
    pub fn load_path(path: &Path) -> Result<PageSource> {
        if path.is_dir() {
            Ok(PageSource::Directory(Self::load_directory(path)?))
        } else {
            Ok(PageSource::File(Self::load_single(path)?.into_iter()))
        }
    }
}

/// 확장자가 `.pdf`인지 (대소문자 무시)
fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(PDF_EXTENSION))
        .unwrap_or(false)
}

fn load_pdf_pages(path: &Path) -> Result<Vec<Document>> {
    let pages = pdf::extract_text_from_pdf(path)?;
    let total_pages = pages.len();
    let source = path.display().to_string();

    Ok(pages
        .into_iter()
        .map(|(page, text)| Document {
            text,
            metadata: DocumentMetadata {
                source: source.clone(),
                page,
                total_pages,
            },
        })
        .collect())
}

// ============================================================================
// Lazy page sequences
// ============================================================================

/// 폴더 안 PDF들의 페이지를 차례로 내놓는 지연 이터레이터
///
/// 한 번에 한 파일의 페이지만 메모리에 올립니다. 단일 패스입니다.
#[derive(Debug)]
pub struct DirectoryPages {
    files: VecDeque<PathBuf>,
    current: std::vec::IntoIter<Document>,
    skipped: Vec<SkippedFile>,
}

impl DirectoryPages {
    /// 지금까지 건너뛴 파일
    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    /// 아직 읽지 않은 파일 수
    pub fn remaining_files(&self) -> usize {
        self.files.len()
    }
}

impl Iterator for DirectoryPages {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        loop {
            if let Some(doc) = self.current.next() {
                return Some(doc);
            }

            let file = self.files.pop_front()?;
            match load_pdf_pages(&file) {
                Ok(pages) => {
                    tracing::debug!("Loaded {} page(s) from {:?}", pages.len(), file);
                    self.current = pages.into_iter();
                }
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", file, e);
                    self.skipped.push(SkippedFile {
                        path: file,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

/// 파일 또는 폴더에서 온 페이지 시퀀스
#[derive(Debug)]
pub enum PageSource {
    File(std::vec::IntoIter<Document>),
    Directory(DirectoryPages),
}

impl PageSource {
    /// 건너뛴 파일 (단일 파일 로드는 항상 비어 있음)
    pub fn skipped(&self) -> &[SkippedFile] {
        match self {
            PageSource::File(_) => &[],
            PageSource::Directory(pages) => pages.skipped(),
        }
    }
}

impl Iterator for PageSource {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        match self {
            PageSource::File(pages) => pages.next(),
            PageSource::Directory(pages) => pages.next(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Path::new("a.pdf")));
        assert!(is_pdf(Path::new("dir/Report.PDF")));
        assert!(!is_pdf(Path::new("notes.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn test_load_single_missing() {
        let result = DocumentLoader::load_single(Path::new("/no/such/file.pdf"));
        assert!(matches!(result, Err(RagError::NotFound(_))));
    }

    #[test]
    fn test_load_single_wrong_extension_not_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text").unwrap();

        let result = DocumentLoader::load_single(&path);
        assert!(matches!(result, Err(RagError::InvalidFormat(_))));
    }

    #[test]
    fn test_load_directory_errors() {
        let result = DocumentLoader::load_directory(Path::new("/no/such/dir"));
        assert!(matches!(result, Err(RagError::NotFound(_))));

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        let result = DocumentLoader::load_directory(&file);
        assert!(matches!(result, Err(RagError::NotADirectory(_))));
    }

    #[test]
    fn test_directory_skips_corrupt_and_non_pdf() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"garbage").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"# hi").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("deep.pdf"), b"garbage").unwrap();

        let mut pages = DocumentLoader::load_directory(dir.path()).unwrap();
        assert_eq!(pages.remaining_files(), 1);

        assert!(pages.next().is_none());
        assert_eq!(pages.skipped().len(), 1);
        assert!(pages.skipped()[0].path.ends_with("broken.pdf"));
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let pages: Vec<Document> = DocumentLoader::load_directory(dir.path())
            .unwrap()
            .collect();
        assert!(pages.is_empty());
    }
}
