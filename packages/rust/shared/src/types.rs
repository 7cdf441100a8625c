//! Core domain types shared by the planner, navigator and assembler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::block::ContentBlock;

// ---------------------------------------------------------------------------
// Capability / ContentType
// ---------------------------------------------------------------------------

/// A kind of content a question may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    NavGraph,
    CodeMap,
    ApiSpec,
    Transcript,
    Section,
    Manifest,
    Readme,
    Routes,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 8] = [
        Capability::NavGraph,
        Capability::CodeMap,
        Capability::ApiSpec,
        Capability::Transcript,
        Capability::Section,
        Capability::Manifest,
        Capability::Readme,
        Capability::Routes,
    ];

    /// Stable snake_case name, as used in logs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::NavGraph => "nav_graph",
            Capability::CodeMap => "code_map",
            Capability::ApiSpec => "api_spec",
            Capability::Transcript => "transcript",
            Capability::Section => "section",
            Capability::Manifest => "manifest",
            Capability::Readme => "readme",
            Capability::Routes => "routes",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of an extracted content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Section,
    NavBar,
    CodeMap,
    ApiSpec,
    Transcript,
    Route,
    Manifest,
    Readme,
}

impl ContentType {
    /// The capability this content type satisfies.
    ///
    /// This is the one content-type → capability table; the adapters and the
    /// assembler both go through it.
    pub fn capability(&self) -> Capability {
        match self {
            ContentType::Section => Capability::Section,
            ContentType::NavBar => Capability::NavGraph,
            ContentType::CodeMap => Capability::CodeMap,
            ContentType::ApiSpec => Capability::ApiSpec,
            ContentType::Transcript => Capability::Transcript,
            ContentType::Route => Capability::Routes,
            ContentType::Manifest => Capability::Manifest,
            ContentType::Readme => Capability::Readme,
        }
    }

    /// Stable snake_case name, as used in logs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Section => "section",
            ContentType::NavBar => "nav_bar",
            ContentType::CodeMap => "code_map",
            ContentType::ApiSpec => "api_spec",
            ContentType::Transcript => "transcript",
            ContentType::Route => "route",
            ContentType::Manifest => "manifest",
            ContentType::Readme => "readme",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Coarse classification of what a question asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    HowTo,
    WhatIs,
    WhereIs,
    Why,
    When,
    General,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::HowTo => "how_to",
            QuestionType::WhatIs => "what_is",
            QuestionType::WhereIs => "where_is",
            QuestionType::Why => "why",
            QuestionType::When => "when",
            QuestionType::General => "general",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the question planner. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningResult {
    /// The question as asked.
    pub question: String,
    /// Lowercased, whitespace-collapsed, stop-word-stripped question.
    pub normalized_question: String,
    /// Distinct keywords, in order of first appearance.
    pub keywords: Vec<String>,
    /// Capabilities to satisfy, highest score first.
    pub required_capabilities: Vec<Capability>,
    /// Weight per scored capability.
    pub capability_scores: BTreeMap<Capability, f64>,
    pub question_type: QuestionType,
    /// Overall planning confidence in `[0, 1]`.
    pub confidence: f64,
}

impl PlanningResult {
    /// The planner's weight for a capability, `0.0` when it was not required.
    pub fn weight_of(&self, capability: Capability) -> f64 {
        if !self.required_capabilities.contains(&capability) {
            return 0.0;
        }
        self.capability_scores
            .get(&capability)
            .copied()
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// A link discovered on a fetched page, waiting to be crawled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub url: Url,
    /// Visible anchor text.
    pub anchor_text: String,
    /// The anchor's `title` attribute, if any.
    pub title: String,
    /// Relevance score against the question keywords.
    pub score: f64,
    /// Link distance from the seed (seed = 0).
    pub depth: u32,
    /// Page the link was found on; `None` for the seed.
    pub parent_url: Option<Url>,
}

/// Per-session crawl counters. Reset for every session, never shared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationStats {
    pub urls_visited: usize,
    pub urls_queued: usize,
    pub bytes_fetched: u64,
    pub errors: usize,
    /// Mean score of the live queue after the last iteration.
    pub avg_score: f64,
    pub depth_reached: u32,
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Attribution for one source URL in the final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    /// First 200 characters of the block content, with `...` when cut.
    pub snippet: String,
    pub content_type: ContentType,
}

/// Counters describing one assembly run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub blocks_original: usize,
    pub blocks_after_dedup: usize,
    pub blocks_final: usize,
    pub blocks_filtered: usize,
    pub total_chars: usize,
    pub avg_block_chars: f64,
    pub capabilities_requested: usize,
    pub capabilities_covered: usize,
    pub keywords_used: usize,
    /// Whether the last selected block was truncated to fit the budget.
    pub truncated: bool,
}

/// The budgeted, deduplicated, capability-covering selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyResult {
    pub selected_blocks: Vec<ContentBlock>,
    pub capability_coverage: BTreeMap<Capability, bool>,
    /// Total characters across `selected_blocks`.
    pub char_count: usize,
    pub duplicates_removed: usize,
    pub citations: Vec<Citation>,
    pub stats: AssemblyStats,
    /// Set when assembly failed internally and this is the empty fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssemblyResult {
    /// An empty, zero-coverage result annotated with `error`.
    pub fn failed(required: &[Capability], error: impl Into<String>) -> Self {
        Self {
            capability_coverage: required.iter().map(|c| (*c, false)).collect(),
            stats: AssemblyStats {
                capabilities_requested: required.len(),
                ..AssemblyStats::default()
            },
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Capabilities that ended up represented in the selection.
    pub fn covered(&self) -> Vec<Capability> {
        self.capability_coverage
            .iter()
            .filter(|(_, covered)| **covered)
            .map(|(cap, _)| *cap)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_content_type_maps_to_one_capability() {
        let types = [
            ContentType::Section,
            ContentType::NavBar,
            ContentType::CodeMap,
            ContentType::ApiSpec,
            ContentType::Transcript,
            ContentType::Route,
            ContentType::Manifest,
            ContentType::Readme,
        ];
        let mut caps: Vec<Capability> = types.iter().map(|t| t.capability()).collect();
        caps.sort();
        caps.dedup();
        assert_eq!(caps.len(), Capability::ALL.len());
    }

    #[test]
    fn capability_serializes_snake_case() {
        let json = serde_json::to_string(&Capability::ApiSpec).expect("serialize");
        assert_eq!(json, "\"api_spec\"");
        let parsed: ContentType = serde_json::from_str("\"nav_bar\"").expect("deserialize");
        assert_eq!(parsed, ContentType::NavBar);
    }

    #[test]
    fn failed_result_has_zero_coverage() {
        let result = AssemblyResult::failed(&[Capability::Section, Capability::ApiSpec], "boom");
        assert!(result.selected_blocks.is_empty());
        assert_eq!(result.capability_coverage.len(), 2);
        assert!(result.covered().is_empty());
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
