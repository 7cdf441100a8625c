//! Plain-text adapter: prose, READMEs, package manifests and OpenAPI JSON.

use serde_json::{Map, Value};
use sitequery_shared::{
    BlockPolicy, Capability, ContentBlock, ContentType, Result, SiteQueryError,
};
use tracing::debug;
use url::Url;

use super::{Document, ExtractionAdapter, section_title, split_sections, wants};

/// File names recognised as dependency manifests.
const MANIFEST_FILES: [&str; 8] = [
    "package.json",
    "cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "setup.py",
    "go.mod",
    "composer.json",
    "gemfile",
];

const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "patch", "delete", "head", "options"];

const SUPPORTED: [Capability; 4] = [
    Capability::Section,
    Capability::Readme,
    Capability::Manifest,
    Capability::ApiSpec,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Manifest,
    Readme,
    OpenApi,
    Prose,
}

/// Adapter for non-HTML text documents.
pub struct TextAdapter {
    policy: BlockPolicy,
    max_section_chars: usize,
}

impl TextAdapter {
    pub fn new(policy: BlockPolicy, max_section_chars: usize) -> Self {
        Self {
            policy,
            max_section_chars: max_section_chars.max(1),
        }
    }

    fn blocks(
        &self,
        content_type: ContentType,
        text: &str,
        url: &Url,
        title: impl Fn(&str, usize, usize) -> String,
        kind: &str,
    ) -> Vec<ContentBlock> {
        let pieces = split_sections(text, self.max_section_chars);
        let count = pieces.len();
        pieces
            .iter()
            .enumerate()
            .filter_map(|(index, piece)| {
                let mut metadata = Map::new();
                metadata.insert("extraction_method".into(), Value::from(kind));
                metadata.insert("section_index".into(), Value::from(index));
                metadata.insert("word_count".into(), Value::from(piece.split_whitespace().count()));
                self.policy
                    .build(content_type, piece, url.as_str(), Some(title(piece, index, count)), metadata)
                    .inspect_err(|e| debug!(%url, error = %e, "dropped block"))
                    .ok()
            })
            .collect()
    }
}

impl ExtractionAdapter for TextAdapter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_capabilities(&self) -> &'static [Capability] {
        &SUPPORTED
    }

    fn can_handle(&self, url: &Url, content_type: Option<&str>, preview: Option<&str>) -> f64 {
        let preview = preview.unwrap_or("");
        if preview.trim().is_empty() {
            return 0.0;
        }
        let ct = content_type.map(str::to_ascii_lowercase).unwrap_or_default();
        if ct.starts_with("text/html") || ct.starts_with("application/xhtml") {
            return 0.0;
        }

        match classify(url, &ct, preview) {
            TextKind::Manifest | TextKind::OpenApi => 0.85,
            TextKind::Readme => 0.8,
            TextKind::Prose if ct.starts_with("text/") => 0.7,
            TextKind::Prose if ct.is_empty() && !preview.trim_start().starts_with('<') => 0.55,
            TextKind::Prose => 0.0,
        }
    }

    fn extract_content(
        &self,
        doc: &Document<'_>,
        capabilities: &[Capability],
        _max_depth: u32,
    ) -> Result<Vec<ContentBlock>> {
        let ct = doc
            .content_type
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let kind = classify(doc.url, &ct, doc.body);
        let file = file_name(doc.url);

        let blocks = match kind {
            TextKind::Manifest if wants(capabilities, Capability::Manifest) => self.blocks(
                ContentType::Manifest,
                doc.body,
                doc.url,
                |_, i, n| numbered(&format!("Manifest: {file}"), i, n),
                "manifest",
            ),
            TextKind::Readme if wants(capabilities, Capability::Readme) => self.blocks(
                ContentType::Readme,
                doc.body,
                doc.url,
                |_, i, n| numbered("README", i, n),
                "readme",
            ),
            TextKind::OpenApi if wants(capabilities, Capability::ApiSpec) => {
                let summary = summarize_openapi(doc.body)?;
                self.blocks(
                    ContentType::ApiSpec,
                    &summary,
                    doc.url,
                    |_, i, n| numbered("API Specification", i, n),
                    "openapi",
                )
            }
            TextKind::OpenApi => Vec::new(),
            _ if wants(capabilities, Capability::Section) => self.blocks(
                ContentType::Section,
                doc.body,
                doc.url,
                |piece, i, _| section_title(piece, i),
                "text",
            ),
            _ => Vec::new(),
        };

        debug!(url = %doc.url, ?kind, blocks = blocks.len(), "text extraction finished");
        Ok(blocks)
    }
}

fn numbered(title: &str, index: usize, count: usize) -> String {
    if count > 1 {
        format!("{title} ({})", index + 1)
    } else {
        title.to_string()
    }
}

fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .to_string()
}

fn classify(url: &Url, content_type: &str, body: &str) -> TextKind {
    let file = file_name(url).to_ascii_lowercase();
    if MANIFEST_FILES.contains(&file.as_str()) {
        return TextKind::Manifest;
    }
    if file.starts_with("readme") {
        return TextKind::Readme;
    }
    let json = content_type.contains("json") || file.ends_with(".json");
    if json {
        let head: String = body.chars().take(512).collect();
        if head.contains("\"openapi\"") || head.contains("\"swagger\"") {
            return TextKind::OpenApi;
        }
    }
    TextKind::Prose
}

/// Title, version and one line per operation of an OpenAPI/Swagger document.
fn summarize_openapi(body: &str) -> Result<String> {
    let doc: Value = serde_json::from_str(body)
        .map_err(|e| SiteQueryError::parse(format!("invalid OpenAPI JSON: {e}")))?;

    let mut lines = Vec::new();
    let info = doc.get("info");
    let title = info
        .and_then(|i| i.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("API");
    match info.and_then(|i| i.get("version")).and_then(Value::as_str) {
        Some(version) => lines.push(format!("# {title} (version {version})")),
        None => lines.push(format!("# {title}")),
    }
    if let Some(description) = info
        .and_then(|i| i.get("description"))
        .and_then(Value::as_str)
    {
        lines.push(description.trim().to_string());
    }
    lines.push(String::new());

    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Err(SiteQueryError::parse("OpenAPI document has no paths"));
    };
    for (path, item) in paths {
        let Some(operations) = item.as_object() else {
            continue;
        };
        for method in HTTP_METHODS {
            let Some(op) = operations.get(method) else {
                continue;
            };
            let summary = op
                .get("summary")
                .or_else(|| op.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim();
            let verb = method.to_ascii_uppercase();
            if summary.is_empty() {
                lines.push(format!("- {verb} {path}"));
            } else {
                lines.push(format!("- {verb} {path} - {summary}"));
            }
        }
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> TextAdapter {
        TextAdapter::new(
            BlockPolicy {
                min_content_length: 40,
                quality_threshold: 0.3,
            },
            2000,
        )
    }

    fn run(url: &str, content_type: Option<&str>, body: &str, caps: &[Capability]) -> Vec<ContentBlock> {
        let url = Url::parse(url).unwrap();
        let doc = Document {
            url: &url,
            content_type,
            body,
        };
        adapter().extract_content(&doc, caps, 1).unwrap()
    }

    const OPENAPI: &str = r#"{
  "openapi": "3.0.0",
  "info": {"title": "Widget API", "version": "2.1", "description": "Manage widgets."},
  "paths": {
    "/widgets": {
      "get": {"summary": "List widgets"},
      "post": {"summary": "Create a widget"}
    },
    "/widgets/{id}": {
      "delete": {"description": "Remove a widget for good"}
    }
  }
}"#;

    #[test]
    fn confidence_depends_on_kind() {
        let a = adapter();
        let url = |s: &str| Url::parse(s).unwrap();
        assert_eq!(a.can_handle(&url("https://a.test/package.json"), Some("application/json"), Some("{}")), 0.85);
        assert_eq!(a.can_handle(&url("https://a.test/README.md"), None, Some("# Hi")), 0.8);
        assert_eq!(a.can_handle(&url("https://a.test/notes"), Some("text/plain"), Some("hello")), 0.7);
        assert_eq!(a.can_handle(&url("https://a.test/page"), Some("text/html"), Some("<p>x</p>")), 0.0);
        assert_eq!(a.can_handle(&url("https://a.test/blob"), Some("application/octet-stream"), Some("x")), 0.0);
        assert_eq!(a.can_handle(&url("https://a.test/notes"), Some("text/plain"), Some("  ")), 0.0);
    }

    #[test]
    fn openapi_is_summarized_per_operation() {
        let blocks = run("https://a.test/openapi.json", Some("application/json"), OPENAPI, &[Capability::ApiSpec]);
        assert_eq!(blocks.len(), 1);
        let content = blocks[0].content();
        assert_eq!(blocks[0].content_type, ContentType::ApiSpec);
        assert!(content.starts_with("# Widget API (version 2.1)"));
        assert!(content.contains("- GET /widgets - List widgets"));
        assert!(content.contains("- POST /widgets - Create a widget"));
        assert!(content.contains("- DELETE /widgets/{id} - Remove a widget for good"));
    }

    #[test]
    fn broken_openapi_is_a_parse_error() {
        let url = Url::parse("https://a.test/openapi.json").unwrap();
        let doc = Document {
            url: &url,
            content_type: Some("application/json"),
            body: r#"{"openapi": "3.0.0", "paths": "#,
        };
        let err = adapter().extract_content(&doc, &[], 1).unwrap_err();
        assert!(matches!(err, SiteQueryError::Parse { .. }));
    }

    #[test]
    fn manifests_and_readmes_get_their_own_types() {
        let manifest = r#"{
  "name": "widgets-client",
  "version": "1.4.0",
  "dependencies": {"axios": "^1.6.0", "zod": "^3.22.0"}
}"#;
        let blocks = run("https://a.test/package.json", Some("application/json"), manifest, &[]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content_type, ContentType::Manifest);
        assert_eq!(blocks[0].title.as_deref(), Some("Manifest: package.json"));

        let readme = "# Widgets\n\nA client for the widget service. Install it with the package manager and call connect.";
        let blocks = run("https://a.test/README.md", Some("text/markdown"), readme, &[]);
        assert_eq!(blocks[0].content_type, ContentType::Readme);
        assert_eq!(blocks[0].title.as_deref(), Some("README"));
    }

    #[test]
    fn prose_is_split_into_sections_only_when_requested() {
        let para = "Configuration lives in a single file that is read at startup and never reloaded.";
        let body = format!("{para}\n\n{para}");
        let blocks = run("https://a.test/notes.txt", Some("text/plain"), &body, &[Capability::Section]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content_type, ContentType::Section);

        let none = run("https://a.test/notes.txt", Some("text/plain"), &body, &[Capability::CodeMap]);
        assert!(none.is_empty());
    }
}
