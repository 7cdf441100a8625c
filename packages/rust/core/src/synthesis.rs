//! Answer synthesis.
//!
//! The assembled selection is handed to an [`AnswerSynthesizer`] to produce
//! the final text. A language-model backed implementation plugs in here; the
//! built-in [`ExcerptSynthesizer`] quotes the best blocks verbatim so the
//! pipeline works without one.

use async_trait::async_trait;

use sitequery_shared::{AssemblyResult, ContentBlock, ELLIPSIS, Result};

/// Produces the answer text from an assembled selection.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Write an answer to `question` from `assembly`.
    ///
    /// Implementations should cite sources with `[n]` markers that index
    /// into `assembly.citations` starting from 1.
    async fn synthesize(&self, question: &str, assembly: &AssemblyResult) -> Result<String>;
}

/// Answer returned when nothing relevant was selected.
pub const NO_CONTENT_ANSWER: &str =
    "No relevant content was found at the requested location for this question.";

/// Quotes the highest-ranked blocks with numbered citation markers.
#[derive(Debug, Clone)]
pub struct ExcerptSynthesizer {
    /// Maximum blocks quoted.
    pub max_excerpts: usize,
    /// Maximum characters quoted per block.
    pub excerpt_chars: usize,
}

impl Default for ExcerptSynthesizer {
    fn default() -> Self {
        Self {
            max_excerpts: 3,
            excerpt_chars: 600,
        }
    }
}

impl ExcerptSynthesizer {
    fn excerpt(&self, block: &ContentBlock) -> String {
        let text = block.content().trim();
        if text.chars().count() <= self.excerpt_chars {
            return text.to_string();
        }
        let keep = self.excerpt_chars.saturating_sub(ELLIPSIS.len());
        let mut cut: String = text.chars().take(keep).collect();
        cut.truncate(cut.trim_end().len());
        cut.push_str(ELLIPSIS);
        cut
    }
}

#[async_trait]
impl AnswerSynthesizer for ExcerptSynthesizer {
    fn name(&self) -> &str {
        "excerpt"
    }

    async fn synthesize(&self, _question: &str, assembly: &AssemblyResult) -> Result<String> {
        if assembly.selected_blocks.is_empty() {
            return Ok(NO_CONTENT_ANSWER.to_string());
        }

        let mut parts = Vec::new();
        for block in assembly.selected_blocks.iter().take(self.max_excerpts) {
            let marker = assembly
                .citations
                .iter()
                .position(|c| c.url == block.source_url)
                .map(|i| format!(" [{}]", i + 1))
                .unwrap_or_default();
            let heading = block.title.as_deref().unwrap_or(block.content_type.as_str());
            parts.push(format!("{heading}{marker}\n{}", self.excerpt(block)));
        }

        let mut answer = parts.join("\n\n");
        if !assembly.citations.is_empty() {
            answer.push_str("\n\nSources:");
            for (i, citation) in assembly.citations.iter().enumerate() {
                answer.push_str(&format!("\n[{}] {} <{}>", i + 1, citation.title, citation.url));
            }
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use sitequery_shared::{BlockPolicy, Citation, ContentType};

    use super::*;

    fn block(content: &str, url: &str, title: &str) -> ContentBlock {
        BlockPolicy {
            min_content_length: 10,
            quality_threshold: 0.0,
        }
        .build(ContentType::Section, content, url, Some(title.into()), Map::new())
        .unwrap()
    }

    fn citation(url: &str, title: &str) -> Citation {
        Citation {
            url: url.into(),
            title: title.into(),
            snippet: String::new(),
            content_type: ContentType::Section,
        }
    }

    #[tokio::test]
    async fn excerpts_carry_citation_markers() {
        let assembly = AssemblyResult {
            selected_blocks: vec![
                block("Run the installer and follow the prompts.", "https://a.test/install", "Install"),
                block("Set the token in the config file.", "https://a.test/config", "Configure"),
            ],
            citations: vec![
                citation("https://a.test/install", "Install"),
                citation("https://a.test/config", "Configure"),
            ],
            ..AssemblyResult::default()
        };

        let answer = ExcerptSynthesizer::default()
            .synthesize("how do I install it?", &assembly)
            .await
            .unwrap();

        assert!(answer.starts_with("Install [1]\nRun the installer"));
        assert!(answer.contains("Configure [2]\nSet the token"));
        assert!(answer.ends_with("[2] Configure <https://a.test/config>"));
    }

    #[tokio::test]
    async fn long_blocks_are_cut_and_excerpts_limited() {
        let long = "word ".repeat(100);
        let assembly = AssemblyResult {
            selected_blocks: vec![
                block(&long, "https://a.test/1", "One"),
                block(&long, "https://a.test/2", "Two"),
            ],
            ..AssemblyResult::default()
        };
        let synthesizer = ExcerptSynthesizer {
            max_excerpts: 1,
            excerpt_chars: 50,
        };

        let answer = synthesizer.synthesize("q", &assembly).await.unwrap();
        assert!(answer.starts_with("One\n"));
        assert!(answer.ends_with(ELLIPSIS));
        assert!(!answer.contains("Two"));
    }

    #[tokio::test]
    async fn empty_selection_gets_the_fallback_answer() {
        let answer = ExcerptSynthesizer::default()
            .synthesize("q", &AssemblyResult::default())
            .await
            .unwrap();
        assert_eq!(answer, NO_CONTENT_ANSWER);
    }
}
