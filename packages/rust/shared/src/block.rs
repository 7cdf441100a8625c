//! Content blocks and the policy that admits them.
//!
//! A [`ContentBlock`] can only be built through a [`BlockPolicy`], which
//! enforces the minimum length and quality threshold. The content itself is
//! never edited after construction; [`ContentBlock::truncated`] returns a new
//! block.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ExtractionConfig;
use crate::error::{Result, SiteQueryError};
use crate::types::ContentType;

/// Markers that indicate headings, lists or fenced code.
const STRUCTURE_MARKERS: [&str; 9] = ["#", "*", "-", "1.", "2.", "<h", "<ul", "<ol", "```"];

/// Appended to content cut short by a budget.
pub const ELLIPSIS: &str = "...";

// ---------------------------------------------------------------------------
// ContentBlock
// ---------------------------------------------------------------------------

/// A scored, attributed unit of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub content_type: ContentType,
    content: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Relevance against the question; set by the assembler.
    pub relevance_score: f64,
    /// Intrinsic quality computed at construction.
    pub quality_score: f64,
    char_count: usize,
}

impl ContentBlock {
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Length of `content` in characters.
    pub fn char_count(&self) -> usize {
        self.char_count
    }

    /// A copy cut to at most `max_chars` characters, ending in `...`.
    ///
    /// The copy records `truncated = true` and the original length in its
    /// metadata. Returns `None` when `max_chars` cannot hold the ellipsis.
    pub fn truncated(&self, max_chars: usize) -> Option<ContentBlock> {
        let keep = max_chars.checked_sub(ELLIPSIS.len())?;
        let mut content: String = self.content.chars().take(keep).collect();
        content.push_str(ELLIPSIS);

        let mut metadata = self.metadata.clone();
        metadata.insert("truncated".into(), Value::Bool(true));
        metadata.insert("original_length".into(), Value::from(self.char_count));

        Some(ContentBlock {
            content_type: self.content_type,
            char_count: content.chars().count(),
            content,
            source_url: self.source_url.clone(),
            title: self.title.clone(),
            metadata,
            relevance_score: self.relevance_score,
            quality_score: self.quality_score,
        })
    }

    /// Whether this block is a budget-truncated copy.
    pub fn is_truncated(&self) -> bool {
        self.metadata
            .get("truncated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// BlockPolicy
// ---------------------------------------------------------------------------

/// Admission rules for new content blocks.
#[derive(Debug, Clone)]
pub struct BlockPolicy {
    /// Minimum trimmed length, in characters.
    pub min_content_length: usize,
    /// Minimum quality score in `[0, 1]`.
    pub quality_threshold: f64,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            min_content_length: 100,
            quality_threshold: 0.3,
        }
    }
}

impl From<&ExtractionConfig> for BlockPolicy {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            min_content_length: config.min_content_length,
            quality_threshold: config.quality_threshold,
        }
    }
}

impl BlockPolicy {
    /// Build a block, failing if the content is too short or too low quality.
    pub fn build(
        &self,
        content_type: ContentType,
        content: &str,
        source_url: &str,
        title: Option<String>,
        metadata: Map<String, Value>,
    ) -> Result<ContentBlock> {
        let content = content.trim();
        let char_count = content.chars().count();
        if char_count < self.min_content_length {
            return Err(SiteQueryError::validation(format!(
                "content too short: {char_count} < {}",
                self.min_content_length
            )));
        }

        let quality_score = self.score_quality(content, content_type);
        if quality_score < self.quality_threshold {
            return Err(SiteQueryError::validation(format!(
                "content quality too low: {quality_score:.2} < {:.2}",
                self.quality_threshold
            )));
        }

        Ok(ContentBlock {
            content_type,
            content: content.to_string(),
            source_url: source_url.to_string(),
            title,
            metadata,
            relevance_score: 0.0,
            quality_score,
            char_count,
        })
    }

    /// Heuristic quality of `content` for the given content type, in `[0, 1]`.
    pub fn score_quality(&self, content: &str, content_type: ContentType) -> f64 {
        let len = content.chars().count();
        if len == 0 || content.trim().chars().count() < self.min_content_length {
            return 0.0;
        }

        let mut score: f64 = 1.0;
        if len < 50 {
            score *= 0.3;
        } else if len < 100 {
            score *= 0.6;
        } else if len < 200 {
            score *= 0.8;
        }

        if STRUCTURE_MARKERS.iter().any(|m| content.contains(m)) {
            score = (score + 0.2).min(1.0);
        }

        let non_whitespace = content.chars().filter(|c| !c.is_whitespace()).count();
        if (non_whitespace as f64) < len as f64 * 0.7 {
            score *= 0.7;
        }

        match content_type {
            ContentType::CodeMap => {
                let lower = content.to_lowercase();
                if ["def ", "class ", "function", "import"]
                    .iter()
                    .any(|k| lower.contains(k))
                {
                    score = (score + 0.3).min(1.0);
                }
            }
            ContentType::ApiSpec => {
                if ["GET", "POST", "PUT", "DELETE", "/api/"]
                    .iter()
                    .any(|k| content.contains(k))
                {
                    score = (score + 0.3).min(1.0);
                }
            }
            _ => {}
        }

        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BlockPolicy {
        BlockPolicy::default()
    }

    #[test]
    fn build_trims_and_counts_chars() {
        let text = format!("  {}  ", "é".repeat(150));
        let block = policy()
            .build(ContentType::Section, &text, "https://a.test/", None, Map::new())
            .expect("block");
        assert_eq!(block.char_count(), 150);
        assert_eq!(block.content().chars().count(), block.char_count());
    }

    #[test]
    fn build_rejects_short_content() {
        let err = policy()
            .build(ContentType::Section, "too short", "https://a.test/", None, Map::new())
            .unwrap_err();
        assert!(err.to_string().contains("content too short"));
    }

    #[test]
    fn build_rejects_low_quality() {
        let strict = BlockPolicy {
            min_content_length: 10,
            quality_threshold: 0.9,
        };
        // 60 chars, no structure markers: 1.0 * 0.6
        let err = strict
            .build(ContentType::Section, &"a".repeat(60), "https://a.test/", None, Map::new())
            .unwrap_err();
        assert!(err.to_string().contains("quality too low"));
    }

    #[test]
    fn api_markers_raise_quality() {
        let lenient = BlockPolicy {
            min_content_length: 10,
            quality_threshold: 0.0,
        };
        let plain = "x".repeat(150);
        let api = format!("GET {}", "x".repeat(146));
        let plain_score = lenient.score_quality(&plain, ContentType::ApiSpec);
        let api_score = lenient.score_quality(&api, ContentType::ApiSpec);
        assert!((plain_score - 0.8).abs() < 1e-9);
        assert!((api_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn whitespace_heavy_content_is_penalized() {
        let airy = "a   ".repeat(60);
        let score = policy().score_quality(&airy, ContentType::Section);
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn truncated_copy_leaves_original_untouched() {
        let block = policy()
            .build(ContentType::Section, &"b".repeat(700), "https://a.test/", None, Map::new())
            .expect("block");
        let cut = block.truncated(300).expect("fits ellipsis");

        assert_eq!(cut.char_count(), 300);
        assert!(cut.content().ends_with(ELLIPSIS));
        assert!(cut.is_truncated());
        assert_eq!(cut.metadata["original_length"], Value::from(700));
        assert_eq!(block.char_count(), 700);
        assert!(!block.is_truncated());
        assert!(block.truncated(2).is_none());
    }
}
