//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::error::{RagError, Result};

/// PDF에서 텍스트 추출
///
/// 페이지별로 텍스트를 추출하여 (페이지 번호, 텍스트) 튜플 벡터로 반환합니다.
/// 페이지 번호는 1부터 시작합니다.
///
/// 손상된 파일에서 파서가 panic하는 경우도 `PdfExtract` 에러로 바꿉니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    // PDF 파일 열기
    let bytes = std::fs::read(path).map_err(|e| RagError::io(path, e))?;

    let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }));

    let pages = match extracted {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            return Err(RagError::PdfExtract {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
        Err(_) => {
            return Err(RagError::PdfExtract {
                path: path.to_path_buf(),
                message: "PDF parser panicked (malformed document)".to_string(),
            })
        }
    };

    // 텍스트가 비어있으면 경고
    if pages.iter().all(|p| p.trim().is_empty()) {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    // 페이지 분리가 안 된 출력은 폼피드 기준으로 다시 분리
    let pages = if pages.len() == 1 {
        split_pdf_pages(&pages[0])
    } else {
        pages
    };

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// PDF 텍스트를 폼피드 문자(\x0c)로 페이지 분리
///
/// 빈 페이지도 자리를 유지해 페이지 번호가 실제 쪽수와 일치합니다.
/// 마지막 페이지 뒤의 폼피드만 무시합니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    let body = text.trim_end_matches(|c: char| c == '\x0c' || c.is_whitespace());
    let pages: Vec<String> = body
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // 분리 실패 - 전체를 하나의 페이지로
    vec![text.to_string()]
}

// ============================================================================
// Tests
// ============================================================================
