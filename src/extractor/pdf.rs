//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.
//! 레이아웃 공백은 의미가 없으므로 모든 연속 공백을 하나로 합칩니다.

use crate::error::{Error, Result};

use super::DocumentParser;

/// PDF 파서
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfParser;

impl DocumentParser for PdfParser {
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            Error::UnsupportedFileType(format!("{} (unreadable PDF: {})", filename, e))
        })?;

        // 텍스트가 비어있으면 경고
        if text.trim().is_empty() {
            tracing::warn!(
                "No text extracted from PDF: {}. It might be a scanned document.",
                filename
            );
            return Ok(String::new());
        }

        Ok(collapse_whitespace(&text))
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }
}

/// 연속 공백(개행 포함) → 공백 하나
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Tests
// ============================================================================
