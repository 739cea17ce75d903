//! 제안/리뷰 JSON 레코드

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 제안 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionOperation {
    Create,
    Update,
    AppendSection,
}

impl fmt::Display for SuggestionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::AppendSection => "append_section",
        };
        f.write_str(s)
    }
}

/// 출처 인용
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_name: String,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
}

impl Citation {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            locator: None,
            quote: None,
        }
    }
}

/// 수정 제안
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion_id: String,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    pub target_path: String,
    pub operation: SuggestionOperation,
    pub proposed_markdown: String,
    pub rationale: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// 확장 필드 (그대로 보존)
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Suggestion {
    /// 새 ID(UUID v4)와 현재 시각으로 생성
    pub fn new(
        target_path: String,
        operation: SuggestionOperation,
        proposed_markdown: String,
        rationale: String,
        citations: Vec<Citation>,
    ) -> Self {
        Self {
            suggestion_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            target_path,
            operation,
            proposed_markdown,
            rationale,
            citations,
            extra: BTreeMap::new(),
        }
    }
}

/// 리뷰 결정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// 리뷰된 제안
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewedSuggestion {
    pub suggestion: Suggestion,
    pub decision: ReviewDecision,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub reviewed_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// 지식베이스에 적용된 시각 (적용 전에는 없음)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "timestamp::deserialize_opt"
    )]
    pub applied_at: Option<DateTime<Utc>>,
}

impl ReviewedSuggestion {
    pub fn new(
        suggestion: Suggestion,
        decision: ReviewDecision,
        reviewer: Option<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            suggestion,
            decision,
            reviewed_at: Utc::now(),
            reviewer,
            notes,
            applied_at: None,
        }
    }
}

/// RFC 3339 또는 타임존 없는 ISO 시각(UTC로 간주)
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }

    fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(
            serde_json::to_string(&SuggestionOperation::AppendSection).unwrap(),
            "\"append_section\""
        );
        assert_eq!(
            serde_json::from_str::<ReviewDecision>("\"rejected\"").unwrap(),
            ReviewDecision::Rejected
        );
    }

    #[test]
    fn test_suggestion_defaults_on_read() {
        // created_at, citations, extra 생략 가능
        let json = r##"{
            "suggestion_id": "s1",
            "target_path": "kb/a.md",
            "operation": "create",
            "proposed_markdown": "# A",
            "rationale": "r",
            "extra": {"model": "none"}
        }"##;
        let s: Suggestion = serde_json::from_str(json).unwrap();
        assert_eq!(s.operation, SuggestionOperation::Create);
        assert!(s.citations.is_empty());
        assert_eq!(s.extra["model"], "none");
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let json = r#"{
            "suggestion": {
                "suggestion_id": "s1",
                "created_at": "2024-05-01T10:20:30.123456",
                "target_path": "kb/a.md",
                "operation": "update",
                "proposed_markdown": "x",
                "rationale": "r"
            },
            "decision": "approved",
            "reviewed_at": "2024-05-02T08:00:00Z"
        }"#;
        let r: ReviewedSuggestion = serde_json::from_str(json).unwrap();
        assert_eq!(r.suggestion.created_at.to_rfc3339(), "2024-05-01T10:20:30.123456+00:00");
        assert_eq!(r.decision, ReviewDecision::Approved);
        assert!(r.reviewer.is_none());
        assert!(r.applied_at.is_none());
    }

    #[test]
    fn test_applied_at_round_trip() {
        let suggestion = Suggestion::new(
            "kb/a.md".to_string(),
            SuggestionOperation::AppendSection,
            "x".to_string(),
            "r".to_string(),
            vec![],
        );
        let mut reviewed = ReviewedSuggestion::new(suggestion, ReviewDecision::Approved, None, None);
        let json = serde_json::to_value(&reviewed).unwrap();
        assert!(json.get("applied_at").is_none());

        reviewed.applied_at = Some(Utc::now());
        let json = serde_json::to_string(&reviewed).unwrap();
        let back: ReviewedSuggestion = serde_json::from_str(&json).unwrap();
        assert_eq!(back.applied_at, reviewed.applied_at);
    }

    #[test]
    fn test_citation_optional_fields() {
        let json = r#"{"source_name":"a","locator":"p. 2","quote":null}"#;
        let c: Citation = serde_json::from_str(json).unwrap();
        assert_eq!(c.locator.as_deref(), Some("p. 2"));
        assert!(c.quote.is_none());
    }
}
