//! Text Chunking Module
//!
//! Markdown 헤더 경계로 섹션을 나누고, 최대 크기를 넘는 섹션만
//! 고정 길이 슬라이딩 윈도우(오버랩 포함)로 다시 나눕니다.
//!
//! 윈도우 길이는 바이트가 아니라 문자(`char`) 수 기준입니다.
//! 코드 포인트 중간은 자르지 않지만, 여러 코드 포인트로 이루어진
//! 그래핌(결합 문자, 이모지 시퀀스 등)은 윈도우 경계에서 나뉠 수 있습니다.

use crate::error::{Error, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 윈도우 크기 (문자 수)
    pub max_chars: usize,
    /// 연속 윈도우 간 오버랩 (문자 수)
    pub overlap_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 2400,
            overlap_chars: 200,
        }
    }
}

impl ChunkConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        let config = Self {
            max_chars,
            overlap_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(Error::InvalidConfiguration(
                "max_chars must be > 0".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(Error::InvalidConfiguration(format!(
                "overlap_chars ({}) must be < max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    /// 윈도우 이동 폭
    fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

impl From<&crate::config::ChunkingSettings> for ChunkConfig {
    fn from(s: &crate::config::ChunkingSettings) -> Self {
        Self {
            max_chars: s.max_chars,
            overlap_chars: s.overlap_chars,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할 (순서 유지)
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// MarkdownChunker
// ============================================================================

/// Markdown 인식 청커
///
/// - `#`로 시작하는 줄에서 새 섹션 시작
/// - 섹션이 `max_chars` 이하면 그대로 하나의 청크
/// - 초과하면 `max_chars - overlap_chars` 간격의 윈도우로 분할
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    config: ChunkConfig,
}

impl MarkdownChunker {
    /// 설정으로 생성 (검증 포함)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Markdown을 헤더 기준 섹션으로 분할
    fn split_sections(text: &str) -> Vec<String> {
        let mut sections = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in text.lines() {
            if line.starts_with('#') && !current.is_empty() {
                sections.push(current.join("\n"));
                current.clear();
            }
            current.push(line);
        }
        if !current.is_empty() {
            sections.push(current.join("\n"));
        }

        sections
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// 긴 섹션을 슬라이딩 윈도우로 분할
    fn split_windows(&self, section: &str) -> Vec<String> {
        // 문자 오프셋 -> 바이트 오프셋 (끝 포함)
        let mut bounds: Vec<usize> = section.char_indices().map(|(i, _)| i).collect();
        let char_len = bounds.len();
        bounds.push(section.len());

        if char_len <= self.config.max_chars {
            return vec![section.to_string()];
        }

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.config.max_chars).min(char_len);
            windows.push(section[bounds[start]..bounds[end]].to_string());
            if end >= char_len {
                break;
            }
            start += self.config.stride();
        }

        windows
    }
}

impl Chunker for MarkdownChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        Self::split_sections(text)
            .iter()
            .flat_map(|s| self.split_windows(s))
            .collect()
    }

    fn name(&self) -> &'static str {
        "MarkdownChunker"
    }
}

/// 설정 검증 후 한 번에 청킹
pub fn chunk_markdown(text: &str, max_chars: usize, overlap_chars: usize) -> Result<Vec<String>> {
    let chunker = MarkdownChunker::new(ChunkConfig::new(max_chars, overlap_chars)?)?;
    Ok(chunker.chunk(text))
}

// ============================================================================
// Tests
// ============================================================================
