//! 지식베이스 수정 제안 워크플로
//!
//! 제안 생성 → 리뷰 결정 → 승인된 제안 적용. 각 단계의 결과는 JSON 파일로 남습니다.
//! - `suggestions/<id>.suggestion.json`
//! - `reviews/<id>.review.json`

mod models;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::knowledge::parse_front_matter;
use crate::pipeline::{list_normalized, list_with_suffix};

pub use models::{Citation, ReviewDecision, ReviewedSuggestion, Suggestion, SuggestionOperation};

pub const SUGGESTION_SUFFIX: &str = ".suggestion.json";
pub const REVIEW_SUFFIX: &str = ".review.json";

/// 대상 문서를 지정하지 않았을 때 (kb_dir 기준)
pub const DEFAULT_TARGET: &str = "inbox.md";

/// 발췌에 사용할 최대 파일 수
const EXCERPT_FILES: usize = 3;
/// 발췌 최대 길이 (문자 수)
const EXCERPT_CHARS: usize = 1200;

// ============================================================================
// Generate
// ============================================================================

/// 정규화된 업로드에서 휴리스틱 제안 생성
///
/// 앞쪽 파일들의 발췌를 `append_section` 초안으로 만들고, 모든 정규화 파일을 인용합니다.
pub fn generate_suggestion(settings: &Settings, target: Option<&str>) -> Result<(Suggestion, PathBuf)> {
    let normalized = list_normalized(settings)?;
    if normalized.is_empty() {
        return Err(Error::NotFound(
            "No normalized files found. Run `ingest` then `normalize` first.".to_string(),
        ));
    }

    let target_path = settings.kb_dir.join(target.unwrap_or(DEFAULT_TARGET));
    let suggestion = heuristic_suggestion(&target_path, &normalized)?;

    let dir = settings.suggestions_dir();
    let out = dir.join(format!("{}{}", suggestion.suggestion_id, SUGGESTION_SUFFIX));
    write_json(&suggestion, &out)?;

    tracing::info!("Generated suggestion {} for {:?}", suggestion.suggestion_id, target_path);
    Ok((suggestion, out))
}

fn heuristic_suggestion(target_path: &Path, normalized: &[PathBuf]) -> Result<Suggestion> {
    let mut parts = Vec::new();
    for path in normalized.iter().take(EXCERPT_FILES) {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        parts.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    let joined = parts.join("\n");
    let excerpt: String = joined.chars().take(EXCERPT_CHARS).collect();

    let proposed_markdown = format!(
        "## Draft from new sources\n\n\
         Heuristic draft assembled from uploaded documents.\n\n\
         ### Excerpt\n\n\
         ```\n{}\n```\n",
        excerpt.trim()
    );

    let citations = normalized
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| Citation::new(n.to_string_lossy()))
        .collect();

    Ok(Suggestion::new(
        target_path.to_string_lossy().replace('\\', "/"),
        SuggestionOperation::AppendSection,
        proposed_markdown,
        "Heuristic suggestion (no language model configured).".to_string(),
        citations,
    ))
}

/// 저장된 제안 목록 (파일 이름 순)
pub fn list_suggestions(settings: &Settings) -> Result<Vec<Suggestion>> {
    list_with_suffix(&settings.suggestions_dir(), SUGGESTION_SUFFIX)?
        .iter()
        .map(|p| read_json(p))
        .collect()
}

// ============================================================================
// Review
// ============================================================================

/// 제안에 대한 리뷰 결정 기록
pub fn review_suggestion(
    settings: &Settings,
    suggestion_id: &str,
    decision: ReviewDecision,
    reviewer: Option<String>,
    notes: Option<String>,
) -> Result<(ReviewedSuggestion, PathBuf)> {
    let source = settings
        .suggestions_dir()
        .join(format!("{}{}", suggestion_id, SUGGESTION_SUFFIX));
    if !source.is_file() {
        return Err(Error::NotFound(format!("Suggestion not found: {}", suggestion_id)));
    }

    let suggestion: Suggestion = read_json(&source)?;
    let mut reviewed = ReviewedSuggestion::new(suggestion, decision, reviewer, notes);

    let out = settings
        .reviews_dir()
        .join(format!("{}{}", suggestion_id, REVIEW_SUFFIX));
    // 이미 적용된 제안을 다시 리뷰해도 재적용하지 않음
    if out.is_file() {
        let previous: ReviewedSuggestion = read_json(&out)?;
        reviewed.applied_at = previous.applied_at;
    }
    write_json(&reviewed, &out)?;

    tracing::info!("Suggestion {} {}", suggestion_id, decision);
    Ok((reviewed, out))
}

// ============================================================================
// Apply
// ============================================================================

/// 승인된 리뷰를 지식베이스에 적용, 변경된 파일 경로 반환
///
/// 적용한 리뷰에는 `applied_at`을 기록하고, 다음 실행에서는 건너뜁니다.
pub fn apply_approved(settings: &Settings) -> Result<Vec<PathBuf>> {
    let review_files = list_with_suffix(&settings.reviews_dir(), REVIEW_SUFFIX)?;
    if review_files.is_empty() {
        return Err(Error::NotFound(
            "No reviews found. Run `review` first.".to_string(),
        ));
    }

    let mut changed = Vec::new();
    for path in &review_files {
        let mut reviewed: ReviewedSuggestion = read_json(path)?;
        if reviewed.decision != ReviewDecision::Approved {
            tracing::debug!("Skipping rejected suggestion {}", reviewed.suggestion.suggestion_id);
            continue;
        }
        if reviewed.applied_at.is_some() {
            tracing::debug!("Skipping applied suggestion {}", reviewed.suggestion.suggestion_id);
            continue;
        }

        let suggestion = &reviewed.suggestion;
        let target = PathBuf::from(&suggestion.target_path);
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        match suggestion.operation {
            SuggestionOperation::AppendSection => {
                append_section(&target, &suggestion.proposed_markdown)?
            }
            SuggestionOperation::Create => create_document(&target, &suggestion.proposed_markdown)?,
            SuggestionOperation::Update => {
                return Err(Error::UnsupportedOperation(format!(
                    "update of {} (suggestion {}) has no locator to apply",
                    suggestion.target_path, suggestion.suggestion_id
                )))
            }
        }

        tracing::info!("Applied {} to {:?}", suggestion.operation, target);
        if !changed.contains(&target) {
            changed.push(target);
        }

        reviewed.applied_at = Some(chrono::Utc::now());
        write_json(&reviewed, path)?;
    }

    Ok(changed)
}

/// 본문 끝에 섹션 추가 (front-matter 유지, 파일이 없으면 생성)
fn append_section(path: &Path, section: &str) -> Result<()> {
    let existing = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::io(path, e)),
    };

    let doc = parse_front_matter(&existing);
    let body = doc.body.trim_end();

    let mut output = String::new();
    if let Some(header) = &doc.raw_header {
        output.push_str(header);
        output.push('\n');
    }
    if !body.is_empty() {
        output.push_str(body);
        output.push_str("\n\n");
    }
    output.push_str(section.trim());
    output.push('\n');

    std::fs::write(path, output).map_err(|e| Error::io(path, e))
}

/// 새 문서 생성 (이미 있으면 실패)
fn create_document(path: &Path, markdown: &str) -> Result<()> {
    if path.exists() {
        return Err(Error::UnsupportedOperation(format!(
            "create: {:?} already exists",
            path
        )));
    }
    std::fs::write(path, format!("{}\n", markdown.trim())).map_err(|e| Error::io(path, e))
}

// ============================================================================
// JSON helpers
// ============================================================================

/// JSON 읽기 (UTF-8 BOM 허용)
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
    serde_json::from_str(raw).map_err(|e| Error::Serialization(format!("{:?}: {}", path, e)))
}

/// JSON 쓰기 (pretty, 디렉토리 자동 생성)
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| Error::io(path, e))
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

    fn seed_normalized(settings: &Settings, files: &[(&str, &str)]) {
        let dir = settings.normalized_dir();
        std::fs::create_dir_all(&dir).unwrap();
        for (name, text) in files {
            std::fs::write(dir.join(format!("{}.normalized.txt", name)), text).unwrap();
        }
    }

    #[test]
    fn test_generate_requires_normalized_files() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        assert!(matches!(
            generate_suggestion(&settings, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_generate_cites_all_and_excerpts_first_three() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        seed_normalized(
            &settings,
            &[("a", "alpha\n"), ("b", "bravo\n"), ("c", "charlie\n"), ("d", "delta\n")],
        );

        let (suggestion, path) = generate_suggestion(&settings, Some("guides/setup.md")).unwrap();
        assert!(path.exists());
        assert_eq!(suggestion.operation, SuggestionOperation::AppendSection);
        assert_eq!(suggestion.citations.len(), 4);
        assert_eq!(suggestion.citations[0].source_name, "a.normalized.txt");
        assert!(suggestion.proposed_markdown.contains("charlie"));
        assert!(!suggestion.proposed_markdown.contains("delta"));
        assert!(suggestion.target_path.ends_with("kb/guides/setup.md"));

        let listed = list_suggestions(&settings).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].suggestion_id, suggestion.suggestion_id);
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        seed_normalized(&settings, &[("big", &"é".repeat(5000))]);

        let (suggestion, _) = generate_suggestion(&settings, None).unwrap();
        let count = suggestion.proposed_markdown.matches('é').count();
        assert_eq!(count, EXCERPT_CHARS);
    }

    #[test]
    fn test_review_unknown_suggestion() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        assert!(matches!(
            review_suggestion(&settings, "nope", ReviewDecision::Approved, None, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_full_workflow_appends_section_and_keeps_front_matter() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        seed_normalized(&settings, &[("memo", "New onboarding step.\n")]);

        std::fs::create_dir_all(&settings.kb_dir).unwrap();
        let target = settings.kb_dir.join("inbox.md");
        std::fs::write(&target, "---\ntitle: Inbox\n---\n\n# Inbox\n\nExisting.\n\n\n").unwrap();

        let (suggestion, _) = generate_suggestion(&settings, None).unwrap();
        let (reviewed, review_path) = review_suggestion(
            &settings,
            &suggestion.suggestion_id,
            ReviewDecision::Approved,
            Some("kim".to_string()),
            Some("looks fine".to_string()),
        )
        .unwrap();
        assert!(review_path.exists());
        assert_eq!(reviewed.reviewer.as_deref(), Some("kim"));

        let changed = apply_approved(&settings).unwrap();
        assert_eq!(changed, vec![target.clone()]);

        let content = std::fs::read_to_string(&target).unwrap();
        assert!(content.starts_with("---\ntitle: Inbox\n---\n\n# Inbox\n\nExisting.\n\n## Draft from new sources"));
        assert!(content.contains("New onboarding step."));
        assert!(content.ends_with("```\n"));
    }

    #[test]
    fn test_rejected_reviews_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        seed_normalized(&settings, &[("memo", "text\n")]);

        let (suggestion, _) = generate_suggestion(&settings, None).unwrap();
        review_suggestion(&settings, &suggestion.suggestion_id, ReviewDecision::Rejected, None, None)
            .unwrap();

        assert!(apply_approved(&settings).unwrap().is_empty());
        assert!(!settings.kb_dir.join(DEFAULT_TARGET).exists());
    }

    #[test]
    fn test_apply_without_reviews() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        assert!(matches!(apply_approved(&settings), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_update_is_unsupported_and_create_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        let target = tmp.path().join("kb").join("new.md");

        let mut suggestion = Suggestion::new(
            target.to_string_lossy().into_owned(),
            SuggestionOperation::Create,
            "# New\n".to_string(),
            "r".to_string(),
            vec![],
        );
        let reviewed = ReviewedSuggestion::new(suggestion.clone(), ReviewDecision::Approved, None, None);
        write_json(&reviewed, &settings.reviews_dir().join(format!("x{}", REVIEW_SUFFIX))).unwrap();

        assert_eq!(apply_approved(&settings).unwrap(), vec![target.clone()]);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# New\n");

        // 다른 리뷰가 같은 파일을 create하려 하면 실패
        let other = Suggestion::new(
            target.to_string_lossy().into_owned(),
            SuggestionOperation::Create,
            "# Other\n".to_string(),
            "r".to_string(),
            vec![],
        );
        let reviewed = ReviewedSuggestion::new(other, ReviewDecision::Approved, None, None);
        write_json(&reviewed, &settings.reviews_dir().join(format!("y{}", REVIEW_SUFFIX))).unwrap();
        assert!(matches!(
            apply_approved(&settings),
            Err(Error::UnsupportedOperation(_))
        ));
        std::fs::remove_file(settings.reviews_dir().join(format!("y{}", REVIEW_SUFFIX))).unwrap();

        suggestion.operation = SuggestionOperation::Update;
        let reviewed = ReviewedSuggestion::new(suggestion, ReviewDecision::Approved, None, None);
        write_json(&reviewed, &settings.reviews_dir().join(format!("x{}", REVIEW_SUFFIX))).unwrap();
        assert!(matches!(
            apply_approved(&settings),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_apply_twice_does_not_duplicate_sections() {
        let tmp = TempDir::new().unwrap();
        let settings = settings_in(tmp.path());
        seed_normalized(&settings, &[("memo", "First memo.\n")]);

        let (first, _) = generate_suggestion(&settings, None).unwrap();
        review_suggestion(&settings, &first.suggestion_id, ReviewDecision::Approved, None, None)
            .unwrap();
        assert_eq!(apply_approved(&settings).unwrap().len(), 1);

        let review_path = settings
            .reviews_dir()
            .join(format!("{}{}", first.suggestion_id, REVIEW_SUFFIX));
        let stored: ReviewedSuggestion = read_json(&review_path).unwrap();
        assert!(stored.applied_at.is_some());

        // 두 번째 승인 후 다시 적용해도 첫 섹션은 한 번만
        let (second, _) = generate_suggestion(&settings, None).unwrap();
        review_suggestion(&settings, &second.suggestion_id, ReviewDecision::Approved, None, None)
            .unwrap();
        assert_eq!(apply_approved(&settings).unwrap().len(), 1);
        assert!(apply_approved(&settings).unwrap().is_empty());

        let content = std::fs::read_to_string(settings.kb_dir.join(DEFAULT_TARGET)).unwrap();
        assert_eq!(content.matches("## Draft from new sources").count(), 2);

        // 적용된 제안을 다시 리뷰해도 재적용되지 않음
        review_suggestion(&settings, &first.suggestion_id, ReviewDecision::Approved, None, None)
            .unwrap();
        assert!(apply_approved(&settings).unwrap().is_empty());
    }

    #[test]
    fn test_read_json_accepts_bom() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("c.json");
        std::fs::write(&path, "\u{feff}{\"source_name\":\"a.txt\"}").unwrap();
        let citation: Citation = read_json(&path).unwrap();
        assert_eq!(citation.source_name, "a.txt");
        assert!(citation.locator.is_none());
    }
}
