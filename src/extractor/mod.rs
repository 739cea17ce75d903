//! 콘텐츠 추출 모듈
//!
//! 업로드 파일(바이트)에서 평문을 추출하는 `DocumentParser`와
//! 확장자 기반 디스패처 [`ParserRegistry`]입니다.
//! - 텍스트/마크다운: UTF-8 (손실 허용) 디코딩
//! - PDF 파일: pdf-extract로 텍스트 추출

pub mod pdf;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::{Error, Result};

pub use pdf::PdfParser;

static HORIZONTAL_SPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\t ]+").expect("horizontal space regex"));

static BLANK_LINES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank lines regex"));

// ============================================================================
// DocumentParser
// ============================================================================

/// 문서 파서 트레이트
pub trait DocumentParser: Send + Sync {
    /// 바이트 → 평문
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<String>;

    /// 처리하는 확장자 (소문자, 점 없이)
    fn extensions(&self) -> &[&'static str];
}

/// 텍스트/마크다운 파서
#[derive(Debug, Default, Clone, Copy)]
pub struct TextParser;

impl DocumentParser for TextParser {
    fn parse(&self, _filename: &str, bytes: &[u8]) -> Result<String> {
        let text = String::from_utf8_lossy(bytes);
        Ok(text.strip_prefix('\u{feff}').unwrap_or(&text).to_string())
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt", "md"]
    }
}

// ============================================================================
// Parser Registry
// ============================================================================

/// 확장자별 파서 레지스트리
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<&'static str, Arc<dyn DocumentParser>>,
}

impl Default for ParserRegistry {
    /// txt, md, pdf 등록
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TextParser));
        registry.register(Arc::new(PdfParser));
        registry
    }
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// 파서 등록 (같은 확장자는 나중 것이 우선)
    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        for ext in parser.extensions() {
            self.parsers.insert(*ext, parser.clone());
        }
    }

    /// 확장자로 파서를 골라 평문 추출
    pub fn parse(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let parser = extension_of(filename)
            .and_then(|ext| self.parsers.get(ext.as_str()))
            .ok_or_else(|| Error::UnsupportedFileType(filename.to_string()))?;
        parser.parse(filename, bytes)
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

// ============================================================================
// Normalization
// ============================================================================

/// 추출 텍스트 정규화
///
/// CRLF → LF, 연속 탭/공백 → 공백 하나, 3줄 이상 빈 줄 → 2줄,
/// 앞뒤 공백 제거 후 개행 하나로 끝냄.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = HORIZONTAL_SPACE_REGEX.replace_all(&text, " ");
    let text = BLANK_LINES_REGEX.replace_all(&text, "\n\n");
    format!("{}\n", text.trim())
}

// ============================================================================
// Tests
// ============================================================================
