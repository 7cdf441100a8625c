//! Extraction adapter trait and the built-in adapters.
//!
//! An adapter turns one fetched document into [`ContentBlock`]s for the
//! capabilities a question needs. The [`AdapterRegistry`] asks every adapter
//! how confident it is about a document and hands it to the most confident
//! one, provided that confidence clears [`MIN_CONFIDENCE`].

mod html;
mod text;

use sitequery_shared::{BlockPolicy, Capability, ContentBlock, ExtractionConfig, Result};
use tracing::{debug, warn};
use url::Url;

pub use html::HtmlAdapter;
pub use text::TextAdapter;

/// An adapter must be strictly more confident than this to be selected.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// How many leading characters of a body adapters see when bidding.
const PREVIEW_CHARS: usize = 1024;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A fetched document handed to an adapter.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub url: &'a Url,
    /// The `Content-Type` header, if the server sent one.
    pub content_type: Option<&'a str>,
    pub body: &'a str,
}

/// Format-specific content extraction.
pub trait ExtractionAdapter: Send + Sync {
    /// Human-readable adapter name for tracing.
    fn name(&self) -> &'static str;

    /// Capabilities this adapter can produce blocks for.
    fn supported_capabilities(&self) -> &'static [Capability];

    /// Confidence in `[0, 1]` that this adapter understands the document.
    fn can_handle(&self, url: &Url, content_type: Option<&str>, preview: Option<&str>) -> f64;

    /// Extract blocks for `capabilities` (all supported ones when empty).
    ///
    /// `max_depth` bounds how deep into the document's heading structure
    /// sections are split.
    fn extract_content(
        &self,
        doc: &Document<'_>,
        capabilities: &[Capability],
        max_depth: u32,
    ) -> Result<Vec<ContentBlock>>;
}

/// Whether `capability` was asked for; an empty request asks for everything.
pub(crate) fn wants(capabilities: &[Capability], capability: Capability) -> bool {
    capabilities.is_empty() || capabilities.contains(&capability)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Result of running the registry over one document.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Name of the adapter that handled the document, if any did.
    pub adapter: Option<&'static str>,
    pub blocks: Vec<ContentBlock>,
}

/// Holds the adapters available to one session or process.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ExtractionAdapter>>,
    max_content_size: usize,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn empty(max_content_size: usize) -> Self {
        Self {
            adapters: Vec::new(),
            max_content_size,
        }
    }

    /// A registry with the built-in HTML and text adapters.
    pub fn with_builtin(config: &ExtractionConfig) -> Self {
        let policy = BlockPolicy::from(config);
        let mut registry = Self::empty(config.max_content_size);
        registry.register(Box::new(HtmlAdapter::new(
            policy.clone(),
            config.max_section_chars,
        )));
        registry.register(Box::new(TextAdapter::new(policy, config.max_section_chars)));
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn ExtractionAdapter>) {
        debug!(adapter = adapter.name(), "registered extraction adapter");
        self.adapters.push(adapter);
    }

    /// Names of registered adapters, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// The most confident adapter, if any clears [`MIN_CONFIDENCE`].
    ///
    /// Earlier registrations win ties.
    pub fn select(
        &self,
        url: &Url,
        content_type: Option<&str>,
        preview: Option<&str>,
    ) -> Option<&dyn ExtractionAdapter> {
        let mut best: Option<(&dyn ExtractionAdapter, f64)> = None;
        for adapter in &self.adapters {
            let confidence = adapter.can_handle(url, content_type, preview).clamp(0.0, 1.0);
            if best.is_none_or(|(_, c)| confidence > c) {
                best = Some((adapter.as_ref(), confidence));
            }
        }

        match best {
            Some((adapter, confidence)) if confidence > MIN_CONFIDENCE => {
                debug!(%url, adapter = adapter.name(), confidence, "selected adapter");
                Some(adapter)
            }
            _ => {
                debug!(%url, "no adapter is confident enough");
                None
            }
        }
    }

    /// Run the best adapter over `doc`.
    ///
    /// Never fails: oversized documents, documents no adapter wants and
    /// adapter errors all produce an empty extraction.
    pub fn extract(
        &self,
        doc: &Document<'_>,
        capabilities: &[Capability],
        max_depth: u32,
    ) -> Extraction {
        if doc.body.len() > self.max_content_size {
            warn!(url = %doc.url, bytes = doc.body.len(), "document too large, skipping extraction");
            return Extraction::default();
        }

        let preview: String = doc.body.chars().take(PREVIEW_CHARS).collect();
        let Some(adapter) = self.select(doc.url, doc.content_type, Some(&preview)) else {
            return Extraction::default();
        };

        match adapter.extract_content(doc, capabilities, max_depth) {
            Ok(blocks) => {
                debug!(url = %doc.url, adapter = adapter.name(), blocks = blocks.len(), "extracted blocks");
                Extraction {
                    adapter: Some(adapter.name()),
                    blocks,
                }
            }
            Err(e) => {
                warn!(url = %doc.url, adapter = adapter.name(), error = %e, "extraction failed");
                Extraction {
                    adapter: Some(adapter.name()),
                    blocks: Vec::new(),
                }
            }
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin(&ExtractionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Text helpers shared by the adapters
// ---------------------------------------------------------------------------

/// Collapse runs of spaces within lines and drop blank lines.
pub(crate) fn tidy_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into sections of at most `max_chars` characters, by
/// paragraph first, then by sentence, then by hard cut.
pub(crate) fn split_sections(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let mut sections = pack(&paragraphs, "\n\n", max_chars);

    let mut out = Vec::new();
    for section in sections.drain(..) {
        if section.chars().count() <= max_chars {
            out.push(section);
            continue;
        }
        let sentences = split_sentences(&section);
        for piece in pack(&sentences, " ", max_chars) {
            if piece.chars().count() <= max_chars {
                out.push(piece);
            } else {
                out.extend(hard_split(&piece, max_chars));
            }
        }
    }
    out
}

/// Greedily join `parts` with `sep` while staying within `max_chars`.
fn pack(parts: &[&str], sep: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for part in parts {
        let part_len = part.chars().count();
        let joined_len = if current.is_empty() {
            part_len
        } else {
            current_len + sep.len() + part_len
        };
        if joined_len > max_chars && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str(sep);
            current_len += sep.len();
        }
        current.push_str(part);
        current_len += part_len;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some((next_i, next)) = chars.peek().copied() {
                if next.is_whitespace() {
                    let sentence = text[start..i + c.len_utf8()].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_i;
                }
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A short title for a text section: its first heading-like line, else its
/// first words.
pub(crate) fn section_title(section: &str, index: usize) -> String {
    for line in section.lines().take(3) {
        let line = line.trim().trim_start_matches('#').trim();
        let len = line.chars().count();
        if len > 10 && len < 100 && !line.ends_with(['.', '?', '!']) {
            return line.to_string();
        }
    }

    let words: Vec<&str> = section.split_whitespace().take(5).collect();
    let title = words.join(" ");
    if title.is_empty() {
        return format!("Section {}", index + 1);
    }
    if title.chars().count() > 50 {
        let cut: String = title.chars().take(47).collect();
        return format!("{cut}...");
    }
    title
}
