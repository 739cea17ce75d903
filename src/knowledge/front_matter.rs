//! Front-matter 파싱
//!
//! 마크다운 파일 맨 앞의 `---` ... `---` YAML 헤더를 분리합니다.
//! 헤더가 없거나 YAML이 깨져 있으면 전체를 본문으로 취급합니다.

use serde_yaml::Value;

/// 파싱된 front-matter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub id: Option<String>,
    /// 스칼라 또는 리스트를 모두 리스트로 정규화
    pub tags: Vec<String>,
}

/// 파싱 결과 (헤더 + 본문)
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub front_matter: FrontMatter,
    /// 원본 헤더 블록 (`---` 포함), 없으면 None
    pub raw_header: Option<String>,
    pub body: String,
}

/// front-matter와 본문 분리
pub fn parse_front_matter(content: &str) -> ParsedDocument {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let Some((header, yaml, body)) = split_header(content) else {
        return ParsedDocument {
            front_matter: FrontMatter::default(),
            raw_header: None,
            body: content.to_string(),
        };
    };

    match serde_yaml::from_str::<Value>(yaml) {
        Ok(value) => ParsedDocument {
            front_matter: FrontMatter::from_value(&value),
            raw_header: Some(header.to_string()),
            body: body.trim_start_matches(['\r', '\n']).to_string(),
        },
        Err(e) => {
            tracing::warn!("Invalid front-matter, treating file as plain body: {}", e);
            ParsedDocument {
                front_matter: FrontMatter::default(),
                raw_header: None,
                body: content.to_string(),
            }
        }
    }
}

/// `(헤더 전체, YAML 부분, 나머지)` 분리
fn split_header(content: &str) -> Option<(&str, &str, &str)> {
    let first_end = content.find('\n')?;
    if content[..first_end].trim_end_matches('\r') != "---" {
        return None;
    }

    let yaml_start = first_end + 1;
    let mut offset = yaml_start;
    for line in content[yaml_start..].split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let header_end = offset + line.len();
            return Some((
                &content[..header_end],
                &content[yaml_start..offset],
                &content[header_end..],
            ));
        }
        offset += line.len();
    }
    None
}

impl FrontMatter {
    fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_mapping() else {
            return Self::default();
        };

        let get = |key: &str| map.get(Value::String(key.to_string()));

        let tags = match get("tags") {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(v) => scalar_to_string(v).into_iter().collect(),
            None => Vec::new(),
        };

        Self {
            title: get("title").and_then(scalar_to_string),
            id: get("id").and_then(scalar_to_string),
            tags,
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
