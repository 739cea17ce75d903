//! 파일 수집 모듈
//!
//! 지식베이스 마크다운과 업로드 입력 파일을 재귀 수집합니다.
//! 지원하는 확장자만 수집하고, 결과는 상대 경로 순으로 정렬됩니다.

use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{Error, Result};

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 마크다운 (.md)
    Markdown,
    /// 일반 텍스트 (.txt)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" => Some(FileType::Markdown),
            "txt" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 수집 루트 기준 상대 경로 (`/` 구분)
    pub relative: String,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 수집할 타입 (비어있으면 모든 지원 타입)
    pub file_types: Vec<FileType>,
    /// `_`로 시작하는 파일 건너뛰기 (include/partial)
    pub skip_underscore: bool,
    /// 읽을 수 없는 항목을 만나면 건너뛰지 않고 실패
    pub fail_on_error: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
            file_types: vec![],
            skip_underscore: false,
            fail_on_error: false,
        }
    }
}

impl CollectorConfig {
    /// 지식베이스 문서 수집용 (마크다운만, `_` 파일 제외)
    pub fn knowledge_base() -> Self {
        Self {
            respect_gitignore: false,
            max_file_size: 0,
            file_types: vec![FileType::Markdown],
            skip_underscore: true,
            fail_on_error: true,
            ..Default::default()
        }
    }

    /// 업로드 입력 수집용 (.txt, .md, .pdf)
    pub fn uploads() -> Self {
        Self::default()
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 폴더 재귀 수집 (상대 경로 오름차순)
    pub fn collect_directory(&self, root: &Path) -> Result<Vec<CollectedFile>> {
        if !root.exists() {
            return Err(Error::NotFound(format!("Directory not found: {:?}", root)));
        }
        if !root.is_dir() {
            return Err(Error::NotFound(format!("Not a directory: {:?}", root)));
        }

        let mut files = Vec::new();

        // ignore 크레이트로 .gitignore 지원
        let walker = WalkBuilder::new(root)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    self.on_walk_error(root, e)?;
                    continue;
                }
            };

            // 파일만 처리
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let Some(file_type) = FileType::from_path(path) else {
                continue; // 지원하지 않는 확장자
            };

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    self.on_walk_error(path, e)?;
                    continue;
                }
            };

            let file = CollectedFile {
                path: path.to_path_buf(),
                relative: relative_posix(root, path),
                file_type,
                size,
            };
            if self.should_include(&file) {
                files.push(file);
            }
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));

        tracing::debug!("Collected {} files from {:?}", files.len(), root);
        Ok(files)
    }

    /// 순회 에러 처리 (엄격 모드면 중단, 아니면 경고 후 건너뜀)
    fn on_walk_error(&self, path: &Path, err: ignore::Error) -> Result<()> {
        if self.config.fail_on_error {
            return Err(Error::io(path, std::io::Error::other(err.to_string())));
        }
        tracing::warn!("Failed to read entry under {:?}: {}", path, err);
        Ok(())
    }

    /// 파일이 필터 조건을 만족하는지 확인
    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.skip_underscore {
            let underscore = file
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('_'))
                .unwrap_or(false);
            if underscore {
                tracing::debug!("Skipping partial: {}", file.relative);
                return false;
            }
        }

        // 파일 크기 제한
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::warn!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }

        self.config.file_types.is_empty() || self.config.file_types.contains(&file.file_type)
    }
}

/// 루트 기준 상대 경로를 `/` 구분 문자열로
pub fn relative_posix(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Tests
// ============================================================================
