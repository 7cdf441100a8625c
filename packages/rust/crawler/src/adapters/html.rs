//! HTML adapter.
//!
//! Produces navigation blocks from `<nav>`-like regions, heading-delimited
//! sections from the main content area, code samples from `<pre>` and
//! endpoint listings as API blocks.

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use sitequery_shared::{BlockPolicy, Capability, ContentBlock, ContentType, Result};
use tracing::debug;
use url::Url;

use super::{Document, ExtractionAdapter, section_title, split_sections, tidy_text, wants};

static NAV_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"nav, [role="navigation"], .navigation, .navbar, .nav, .menu, .main-menu, .site-nav, .breadcrumb, .breadcrumbs"#,
    )
    .unwrap()
});

static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Main-content candidates, most specific first.
const MAIN_SELECTORS: [&str; 9] = [
    "main",
    "article",
    r#"[role="main"]"#,
    ".main-content",
    ".documentation-content",
    ".content",
    "#content",
    "#main",
    "body",
];

/// Elements whose text never belongs to a content section.
const CHROME_TAGS: [&str; 9] = [
    "nav", "header", "footer", "aside", "script", "style", "noscript", "template", "svg",
];

/// Elements that end a line of text.
const BLOCK_TAGS: [&str; 12] = [
    "p", "div", "li", "tr", "br", "dd", "dt", "blockquote", "section", "table", "ul", "ol",
];

/// `GET /path`-style endpoint mentions.
static ENDPOINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(GET|POST|PUT|PATCH|DELETE)\s+/").unwrap());

/// Link groups smaller than this are not worth a link-graph block.
const MIN_LINK_GROUP: usize = 3;

/// Links listed per link-graph block.
const MAX_LINKS_PER_GROUP: usize = 20;

const SUPPORTED: [Capability; 4] = [
    Capability::Section,
    Capability::NavGraph,
    Capability::ApiSpec,
    Capability::CodeMap,
];

/// Adapter for `text/html` documents.
pub struct HtmlAdapter {
    policy: BlockPolicy,
    max_section_chars: usize,
}

impl HtmlAdapter {
    pub fn new(policy: BlockPolicy, max_section_chars: usize) -> Self {
        Self {
            policy,
            max_section_chars: max_section_chars.max(1),
        }
    }

    /// Build a block, dropping content the policy rejects.
    fn block(
        &self,
        content_type: ContentType,
        content: &str,
        url: &Url,
        title: String,
        metadata: Map<String, Value>,
    ) -> Option<ContentBlock> {
        match self
            .policy
            .build(content_type, content, url.as_str(), Some(title), metadata)
        {
            Ok(block) => Some(block),
            Err(e) => {
                debug!(%url, content_type = %content_type, error = %e, "dropped block");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    fn navigation_blocks(&self, html: &Html, url: &Url) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        for nav in html.select(&NAV_SEL) {
            // Nested navigation regions are covered by their outermost one.
            let nested = nav
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| NAV_SEL.matches(&ancestor));
            if nested {
                continue;
            }

            let text = nav.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.chars().count() < 10 {
                continue;
            }

            let links: Vec<String> = nav
                .select(&LINK_SEL)
                .filter_map(|a| describe_link(a, url))
                .collect();
            let mut content = text;
            if !links.is_empty() {
                content.push_str("\n\nLinks: ");
                content.push_str(&links.join("; "));
            }

            let label = nav
                .value()
                .classes()
                .next()
                .unwrap_or(nav.value().name())
                .to_string();
            let mut metadata = Map::new();
            metadata.insert("nav_type".into(), Value::from("navigation"));
            metadata.insert("link_count".into(), Value::from(links.len()));
            blocks.extend(self.block(
                ContentType::NavBar,
                &content,
                url,
                format!("Navigation: {label}"),
                metadata,
            ));
        }

        blocks.extend(self.link_graph_blocks(html, url));
        blocks
    }

    /// One block per page region holding enough links.
    fn link_graph_blocks(&self, html: &Html, url: &Url) -> Vec<ContentBlock> {
        let mut groups: Vec<(&'static str, Vec<String>)> = Vec::new();
        for a in html.select(&LINK_SEL) {
            let Some(line) = describe_link(a, url) else {
                continue;
            };
            let region = link_region(a);
            match groups.iter_mut().find(|(name, _)| *name == region) {
                Some((_, lines)) => lines.push(line),
                None => groups.push((region, vec![line])),
            }
        }

        groups
            .into_iter()
            .filter(|(_, lines)| lines.len() >= MIN_LINK_GROUP)
            .filter_map(|(region, lines)| {
                let listed = &lines[..lines.len().min(MAX_LINKS_PER_GROUP)];
                let content = format!("Link Graph - {region}:\n{}", listed.join("\n"));
                let mut metadata = Map::new();
                metadata.insert("context".into(), Value::from(region));
                metadata.insert("link_count".into(), Value::from(listed.len()));
                metadata.insert("graph_type".into(), Value::from("navigation"));
                self.block(
                    ContentType::NavBar,
                    &content,
                    url,
                    format!("Link Graph: {region}"),
                    metadata,
                )
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Sections
    // -----------------------------------------------------------------------

    fn section_blocks(
        &self,
        root: ElementRef<'_>,
        url: &Url,
        capabilities: &[Capability],
        split_level: u8,
    ) -> Vec<ContentBlock> {
        let mut walker = SectionWalker::new(split_level);
        walker.walk(root);
        walker.flush();

        let mut blocks = Vec::new();
        if wants(capabilities, Capability::Section) || wants(capabilities, Capability::ApiSpec) {
            for (index, section) in walker.sections.iter().enumerate() {
                blocks.extend(self.blocks_for_section(section, index, url, capabilities));
            }
        }
        if wants(capabilities, Capability::CodeMap) {
            for (index, code) in walker.code.iter().enumerate() {
                let mut metadata = Map::new();
                metadata.insert("code_index".into(), Value::from(index));
                if let Some(language) = &code.language {
                    metadata.insert("language".into(), Value::from(language.as_str()));
                }
                let title = match &code.heading {
                    Some(heading) => format!("Code: {heading}"),
                    None => "Code sample".to_string(),
                };
                blocks.extend(self.block(ContentType::CodeMap, &code.text, url, title, metadata));
            }
        }
        blocks
    }

    fn blocks_for_section(
        &self,
        section: &RawSection,
        index: usize,
        url: &Url,
        capabilities: &[Capability],
    ) -> Vec<ContentBlock> {
        let text = tidy_text(&section.text);
        let pieces = split_sections(&text, self.max_section_chars);
        let piece_count = pieces.len();

        let mut blocks = Vec::new();
        for (part, piece) in pieces.into_iter().enumerate() {
            let content_type = if ENDPOINT_RE.is_match(&piece)
                && wants(capabilities, Capability::ApiSpec)
            {
                ContentType::ApiSpec
            } else if wants(capabilities, Capability::Section) {
                ContentType::Section
            } else {
                continue;
            };

            let title = match &section.heading {
                Some(heading) if piece_count > 1 => format!("{heading} ({})", part + 1),
                Some(heading) => heading.clone(),
                None if index == 0 && piece_count == 1 => "Main Content".to_string(),
                None => section_title(&piece, part),
            };

            let mut metadata = Map::new();
            metadata.insert("section_index".into(), Value::from(index));
            if let Some(level) = section.level {
                metadata.insert("heading_level".into(), Value::from(level));
            }
            if piece_count > 1 {
                metadata.insert("part".into(), Value::from(part + 1));
            }
            blocks.extend(self.block(content_type, &piece, url, title, metadata));
        }
        blocks
    }
}

impl ExtractionAdapter for HtmlAdapter {
    fn name(&self) -> &'static str {
        "html"
    }

    fn supported_capabilities(&self) -> &'static [Capability] {
        &SUPPORTED
    }

    fn can_handle(&self, _url: &Url, content_type: Option<&str>, preview: Option<&str>) -> f64 {
        let preview = preview.unwrap_or("");
        if let Some(ct) = content_type {
            let ct = ct.to_ascii_lowercase();
            if ct.starts_with("text/html") || ct.starts_with("application/xhtml") {
                return if preview.trim().is_empty() { 0.0 } else { 0.9 };
            }
        }
        if looks_like_html(preview) { 0.8 } else { 0.0 }
    }

    fn extract_content(
        &self,
        doc: &Document<'_>,
        capabilities: &[Capability],
        max_depth: u32,
    ) -> Result<Vec<ContentBlock>> {
        let html = Html::parse_document(doc.body);
        let mut blocks = Vec::new();

        if wants(capabilities, Capability::NavGraph) {
            blocks.extend(self.navigation_blocks(&html, doc.url));
        }

        let split_level = max_depth.saturating_add(2).min(6) as u8;
        if let Some(root) = main_root(&html) {
            blocks.extend(self.section_blocks(root, doc.url, capabilities, split_level));
        }

        debug!(url = %doc.url, blocks = blocks.len(), "html extraction finished");
        Ok(blocks)
    }
}

// ---------------------------------------------------------------------------
// DOM helpers
// ---------------------------------------------------------------------------

fn looks_like_html(preview: &str) -> bool {
    let head = preview.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html")
        || head.starts_with("<html")
        || head.contains("<body")
        || head.contains("<head")
}

fn main_root(html: &Html) -> Option<ElementRef<'_>> {
    MAIN_SELECTORS.iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        html.select(&selector).next()
    })
}

/// `"text: absolute-url"` for a link with both.
fn describe_link(a: ElementRef<'_>, base: &Url) -> Option<String> {
    let href = a.value().attr("href")?;
    let text = a.text().collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let target = base.join(href).ok()?;
    Some(format!("{text}: {target}"))
}

/// Classify a link by the classes of its nearest ancestors.
fn link_region(a: ElementRef<'_>) -> &'static str {
    let classes: String = a
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(5)
        .flat_map(|el| {
            let mut words: Vec<String> = el.value().classes().map(str::to_lowercase).collect();
            words.push(el.value().name().to_string());
            words
        })
        .collect::<Vec<_>>()
        .join(" ");

    if ["nav", "menu", "header"].iter().any(|w| classes.contains(w)) {
        "navigation"
    } else if ["content", "main", "article"].iter().any(|w| classes.contains(w)) {
        "content"
    } else if ["footer", "bottom"].iter().any(|w| classes.contains(w)) {
        "footer"
    } else if ["sidebar", "aside"].iter().any(|w| classes.contains(w)) {
        "sidebar"
    } else {
        "other"
    }
}

fn heading_level(name: &str) -> Option<u8> {
    let rest = name.strip_prefix('h')?;
    let level: u8 = rest.parse().ok()?;
    (1..=6).contains(&level).then_some(level)
}

struct RawSection {
    heading: Option<String>,
    level: Option<u8>,
    text: String,
}

struct CodeSample {
    heading: Option<String>,
    language: Option<String>,
    text: String,
}

/// Walks the main content in document order, cutting sections at headings.
struct SectionWalker {
    split_level: u8,
    current: RawSection,
    sections: Vec<RawSection>,
    code: Vec<CodeSample>,
}

impl SectionWalker {
    fn new(split_level: u8) -> Self {
        Self {
            split_level,
            current: RawSection {
                heading: None,
                level: None,
                text: String::new(),
            },
            sections: Vec::new(),
            code: Vec::new(),
        }
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.current.text.push_str(text),
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        self.visit(el);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if CHROME_TAGS.contains(&name) {
            return;
        }

        if let Some(level) = heading_level(name) {
            let title = el.text().collect::<Vec<_>>().join(" ");
            let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
            if level <= self.split_level && !title.is_empty() {
                self.flush();
                self.current.heading = Some(title);
                self.current.level = Some(level);
            } else {
                self.current.text.push('\n');
                self.current.text.push_str(&title);
                self.current.text.push('\n');
            }
            return;
        }

        if name == "pre" {
            let code = el.text().collect::<String>();
            let code = code.trim_matches('\n').to_string();
            if !code.trim().is_empty() {
                self.current.text.push('\n');
                self.current.text.push_str(&code);
                self.current.text.push('\n');
                self.code.push(CodeSample {
                    heading: self.current.heading.clone(),
                    language: code_language(el),
                    text: code,
                });
            }
            return;
        }

        let is_block = BLOCK_TAGS.contains(&name);
        if is_block {
            self.current.text.push('\n');
        }
        self.walk(el);
        if is_block {
            self.current.text.push('\n');
        }
    }

    fn flush(&mut self) {
        let done = std::mem::replace(
            &mut self.current,
            RawSection {
                heading: None,
                level: None,
                text: String::new(),
            },
        );
        if !done.text.trim().is_empty() {
            self.sections.push(done);
        }
    }
}

/// `language-xxx` / `lang-xxx` class on a `<pre>` or its `<code>`.
fn code_language(pre: ElementRef<'_>) -> Option<String> {
    let mut elements = vec![pre];
    elements.extend(pre.children().filter_map(ElementRef::wrap));
    elements.iter().find_map(|el| {
        el.value().classes().find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
                .map(str::to_string)
        })
    })
}
