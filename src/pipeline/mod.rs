//! 수집/정규화 파이프라인
//!
//! 1. `ingest_inputs`: 입력 폴더의 지원 파일(.txt, .md, .pdf)을 uploads로 복사
//! 2. `normalize_uploads`: uploads의 각 파일을 평문 추출 + 정규화하여
//!    `normalized/<stem>.normalized.txt`로 저장

use std::path::{Path, PathBuf};

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::extractor::{normalize_text, ParserRegistry};

/// 정규화 결과 파일 접미사
pub const NORMALIZED_SUFFIX: &str = ".normalized.txt";

/// 입력 파일을 uploads 디렉토리로 복사
///
/// 하위 폴더까지 수집하지만 uploads에는 파일 이름만으로 평탄하게 저장합니다.
/// 이름이 겹치면 나중 파일이 덮어씁니다.
pub async fn ingest_inputs(settings: &Settings, input_dir: &Path) -> Result<Vec<PathBuf>> {
    let uploads_dir = settings.uploads_dir();
    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .map_err(|e| Error::io(&uploads_dir, e))?;

    if !input_dir.exists() {
        return Err(Error::NotFound(format!(
            "Input dir not found: {:?}",
            input_dir
        )));
    }

    let files = FileCollector::new(CollectorConfig::uploads()).collect_directory(input_dir)?;

    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.path.file_name() else {
            continue;
        };
        let target = uploads_dir.join(name);
        if uploaded.contains(&target) {
            tracing::warn!("Duplicate upload name {:?}, overwriting", name);
        }

        tokio::fs::copy(&file.path, &target)
            .await
            .map_err(|e| Error::io(&file.path, e))?;
        tracing::debug!("Uploaded {} -> {:?}", file.relative, target);

        if !uploaded.contains(&target) {
            uploaded.push(target);
        }
    }

    tracing::info!("Uploaded {} file(s) to {:?}", uploaded.len(), uploads_dir);
    Ok(uploaded)
}

/// uploads의 파일을 정규화 텍스트로 변환
pub async fn normalize_uploads(settings: &Settings) -> Result<Vec<PathBuf>> {
    let uploads_dir = settings.uploads_dir();
    let normalized_dir = settings.normalized_dir();
    tokio::fs::create_dir_all(&normalized_dir)
        .await
        .map_err(|e| Error::io(&normalized_dir, e))?;

    if !uploads_dir.is_dir() {
        tracing::warn!("Uploads directory not found: {:?}", uploads_dir);
        return Ok(vec![]);
    }

    let registry = ParserRegistry::default();
    let files = FileCollector::new(CollectorConfig::uploads()).collect_directory(&uploads_dir)?;

    let mut outputs = Vec::with_capacity(files.len());
    for file in files {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| Error::io(&file.path, e))?;

        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let parser = registry.clone();
        let name = file.relative.clone();
        let text = tokio::task::spawn_blocking(move || parser.parse(&name, &bytes))
            .await
            .map_err(|e| Error::UnsupportedFileType(format!("{}: {}", file.relative, e)))??;

        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.relative.clone());
        let out = normalized_dir.join(format!("{}{}", stem, NORMALIZED_SUFFIX));

        tokio::fs::write(&out, normalize_text(&text))
            .await
            .map_err(|e| Error::io(&out, e))?;
        outputs.push(out);
    }

    tracing::info!(
        "Normalized {} file(s) to {:?}",
        outputs.len(),
        normalized_dir
    );
    Ok(outputs)
}

/// 정규화된 파일 목록 (이름 순)
pub fn list_normalized(settings: &Settings) -> Result<Vec<PathBuf>> {
    list_with_suffix(&settings.normalized_dir(), NORMALIZED_SUFFIX)
}

/// 디렉토리 바로 아래에서 접미사가 맞는 파일 목록 (이름 순, 없으면 빈 목록)
pub(crate) fn list_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let matches = path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(suffix))
                .unwrap_or(false);
        if matches {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            data_dir: dir.join("data"),
            kb_dir: dir.join("kb"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ingest_copies_supported_files() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        std::fs::create_dir_all(input.join("nested")).unwrap();
        std::fs::write(input.join("a.txt"), "alpha").unwrap();
        std::fs::write(input.join("nested/b.md"), "# B").unwrap();
        std::fs::write(input.join("c.docx"), "skip").unwrap();

        let settings = settings_in(tmp.path());
        let uploaded = ingest_inputs(&settings, &input).await.unwrap();

        assert_eq!(uploaded.len(), 2);
        assert!(settings.uploads_dir().join("a.txt").exists());
        assert!(settings.uploads_dir().join("b.md").exists());
        assert!(!settings.uploads_dir().join("c.docx").exists());
    }

    #[tokio::test]
    async fn test_ingest_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        let result = ingest_inputs(&settings, &tmp.path().join("missing")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_normalize_uploads() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        std::fs::create_dir_all(settings.uploads_dir()).unwrap();
        std::fs::write(
            settings.uploads_dir().join("memo.txt"),
            "Line  one\r\n\r\n\r\n\r\nLine\ttwo  ",
        )
        .unwrap();

        let outputs = normalize_uploads(&settings).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].ends_with("memo.normalized.txt"));
        assert_eq!(
            std::fs::read_to_string(&outputs[0]).unwrap(),
            "Line one\n\nLine two\n"
        );
        assert_eq!(list_normalized(&settings).unwrap(), outputs);
    }

    #[tokio::test]
    async fn test_normalize_without_uploads() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        assert!(normalize_uploads(&settings).await.unwrap().is_empty());
    }
}
