//! 지식베이스 HTML 빌드
//!
//! 마크다운 문서마다 `<상대 경로>.html` 페이지를 만들고, 전체 목차 `index.html`을 씁니다.
//! 페이지 제목은 front-matter `title`, 없으면 파일 이름(stem)입니다.

use std::path::{Path, PathBuf};

use pulldown_cmark::{html, Options, Parser};

use crate::collector::{CollectorConfig, FileCollector};
use crate::error::{Error, Result};
use crate::knowledge::parse_front_matter;

/// 목차 파일 이름
pub const INDEX_FILE: &str = "index.html";

const PAGE_STYLE: &str = "body { font-family: system-ui, Segoe UI, Roboto, Arial, sans-serif; margin: 2rem; max-width: 900px; }
    pre { background: #f6f8fa; padding: 1rem; overflow: auto; }
    code { font-family: ui-monospace, SFMono-Regular, Menlo, Consolas, monospace; }
    table { border-collapse: collapse; }
    th, td { border: 1px solid #d0d7de; padding: 0.3rem 0.6rem; }
    a { color: #0969da; }";

/// 목차 항목
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// html 디렉토리 기준 링크 (`/` 구분)
    pub href: String,
    pub title: String,
}

// ============================================================================
// Build
// ============================================================================

/// 지식베이스 전체를 HTML로 렌더링, 생성한 파일 경로 반환 (목차가 마지막)
pub fn build_html(kb_dir: &Path, html_dir: &Path) -> Result<Vec<PathBuf>> {
    if !kb_dir.is_dir() {
        return Err(Error::NotFound(format!(
            "Knowledge base not found: {:?}",
            kb_dir
        )));
    }
    std::fs::create_dir_all(html_dir).map_err(|e| Error::io(html_dir, e))?;

    let files = FileCollector::new(CollectorConfig::knowledge_base()).collect_directory(kb_dir)?;

    let mut pages = Vec::with_capacity(files.len());
    let mut outputs = Vec::with_capacity(files.len() + 1);

    for file in files {
        let bytes = std::fs::read(&file.path).map_err(|e| Error::io(&file.path, e))?;
        let doc = parse_front_matter(&String::from_utf8_lossy(&bytes));

        let title = doc
            .front_matter
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| file_stem(&file.path));
        let href = page_href(&file.relative);
        let root_prefix = "../".repeat(href.matches('/').count());

        let out = html_dir.join(&href);
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let page = render_page(&title, &render_markdown(&doc.body), &root_prefix);
        std::fs::write(&out, page).map_err(|e| Error::io(&out, e))?;

        tracing::debug!("Rendered {} -> {:?}", file.relative, out);
        outputs.push(out);
        pages.push(Page { href, title });
    }

    let index = html_dir.join(INDEX_FILE);
    std::fs::write(&index, render_index(&pages)).map_err(|e| Error::io(&index, e))?;
    outputs.push(index);

    tracing::info!("Built {} page(s) into {:?}", pages.len(), html_dir);
    Ok(outputs)
}

/// 마크다운 본문 → HTML 조각 (표, 취소선 포함)
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// `guides/setup.md` → `guides/setup.html`
///
/// 루트의 `index.md`는 목차와 겹치지 않도록 `index.page.html`이 됩니다.
fn page_href(relative: &str) -> String {
    let href = Path::new(relative)
        .with_extension("html")
        .to_string_lossy()
        .replace('\\', "/");
    if href == INDEX_FILE {
        "index.page.html".to_string()
    } else {
        href
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ============================================================================
// Templates
// ============================================================================

fn render_page(title: &str, body_html: &str, root_prefix: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!doctype html>
<html lang="ko">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <style>
    {style}
  </style>
</head>
<body>
  <nav><a href="{root_prefix}{index}">Index</a></nav>
  <h1>{title}</h1>
  <article>{body_html}</article>
</body>
</html>
"#,
        title = title,
        style = PAGE_STYLE,
        root_prefix = root_prefix,
        index = INDEX_FILE,
        body_html = body_html,
    )
}

fn render_index(pages: &[Page]) -> String {
    let items: String = pages
        .iter()
        .map(|p| {
            format!(
                "    <li><a href=\"{}\">{}</a></li>\n",
                escape_html(&p.href),
                escape_html(&p.title)
            )
        })
        .collect();

    format!(
        r#"<!doctype html>
<html lang="ko">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Knowledge Base</title>
</head>
<body>
  <h1>Knowledge Base</h1>
  <ul>
{items}  </ul>
</body>
</html>
"#,
        items = items
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_build_html_pages_and_index() {
        let tmp = TempDir::new().unwrap();
        let kb = tmp.path().join("raw");
        let out = tmp.path().join("html");

        write(&kb, "onboarding.md", "---\ntitle: Onboarding & Setup\n---\n# Laptop\n\n| a | b |\n|---|---|\n| 1 | 2 |\n");
        write(&kb, "guides/deploy.md", "Merge to **main**.\n\n```\ncargo build\n```\n");
        write(&kb, "_footer.md", "partial\n");

        let outputs = build_html(&kb, &out).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs.last().unwrap(), &out.join(INDEX_FILE));

        let onboarding = std::fs::read_to_string(out.join("onboarding.html")).unwrap();
        assert!(onboarding.contains("<title>Onboarding &amp; Setup</title>"));
        assert!(onboarding.contains("<h1>Laptop</h1>"));
        assert!(onboarding.contains("<table>"));
        assert!(onboarding.contains(r#"<a href="index.html">"#));
        assert!(!onboarding.contains("title: Onboarding"));

        // front-matter가 없으면 파일 이름이 제목
        let deploy = std::fs::read_to_string(out.join("guides/deploy.html")).unwrap();
        assert!(deploy.contains("<title>deploy</title>"));
        assert!(deploy.contains("<strong>main</strong>"));
        assert!(deploy.contains("<pre><code>cargo build"));
        assert!(deploy.contains(r#"<a href="../index.html">"#));

        assert!(!out.join("_footer.html").exists());

        let index = std::fs::read_to_string(out.join(INDEX_FILE)).unwrap();
        assert!(index.contains(r#"<a href="guides/deploy.html">deploy</a>"#));
        assert!(index.contains(r#"<a href="onboarding.html">Onboarding &amp; Setup</a>"#));
    }

    #[test]
    fn test_build_html_missing_kb() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            build_html(&tmp.path().join("missing"), &tmp.path().join("html")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_kb_still_writes_index() {
        let tmp = TempDir::new().unwrap();
        let kb = tmp.path().join("raw");
        std::fs::create_dir_all(&kb).unwrap();

        let outputs = build_html(&kb, &tmp.path().join("html")).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].ends_with(INDEX_FILE));
    }

    #[test]
    fn test_page_href() {
        assert_eq!(page_href("guides/setup.md"), "guides/setup.html");
        assert_eq!(page_href("notes.markdown"), "notes.html");
        assert_eq!(page_href("index.md"), "index.page.html");
        assert_eq!(page_href("guides/index.md"), "guides/index.html");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
