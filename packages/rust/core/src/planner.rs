//! Question planning: keywords, question type and required capabilities.
//!
//! Planning is a fixed keyword/pattern analysis. It never fails: a question
//! that matches nothing falls back to a per-question-type capability set.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use sitequery_shared::{Capability, PlanningResult, QuestionType};

/// Words stripped while normalizing the question.
const NORMALIZE_STOP_WORDS: [&str; 14] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Three-letter filler words that never become keywords.
const KEYWORD_STOP_WORDS: [&str; 39] = [
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "way", "who", "boy", "did", "man", "men", "put", "say", "she", "too", "use",
];

/// A capability is required when it scores strictly above this.
const REQUIRED_THRESHOLD: f64 = 0.3;

const KEYWORD_WEIGHT: f64 = 0.3;
const PATTERN_WEIGHT: f64 = 0.4;
const MULTI_MATCH_BONUS: f64 = 0.1;

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w{3,}\b").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

struct CapabilityRules {
    capability: Capability,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
}

fn rules(
    capability: Capability,
    keywords: &'static [&'static str],
    patterns: &[&str],
) -> CapabilityRules {
    CapabilityRules {
        capability,
        keywords,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
            .collect(),
    }
}

static CAPABILITY_RULES: LazyLock<Vec<CapabilityRules>> = LazyLock::new(|| {
    vec![
        rules(
            Capability::CodeMap,
            &[
                "code", "function", "class", "method", "implementation", "source", "repository",
                "repo", "github", "gitlab", "programming", "development", "coding", "script",
                "api", "endpoint", "service", "module", "package",
            ],
            &[
                r"\b(code|function|class|method)\b",
                r"\b(how to|how does|implement|write)\b.*\b(code|function)\b",
                r"\b(repository|repo|github|gitlab)\b",
                r"\b(programming|development|coding)\b",
            ],
        ),
        rules(
            Capability::Routes,
            &[
                "route", "routing", "navigation", "url", "path", "endpoint", "link", "menu",
                "structure", "page", "section", "directory", "folder", "hierarchy",
            ],
            &[
                r"\b(route|routing|navigation|url|path)\b",
                r"\b(how to|where is|navigate|find)\b.*\b(page|section)\b",
                r"\b(menu|link|structure|hierarchy)\b",
            ],
        ),
        rules(
            Capability::NavGraph,
            &[
                "navigation", "navigate", "menu", "sidebar", "header", "footer", "breadcrumb",
                "structure", "layout", "interface", "design", "find", "where", "locate",
                "access",
            ],
            &[
                r"\b(navigation|menu|sidebar|header|footer)\b",
                r"\b(how to|where is|navigate)\b.*\b(menu|navigation)\b",
                r"\b(interface|ui|layout|design)\b",
            ],
        ),
        rules(
            Capability::Transcript,
            &[
                "video", "transcript", "caption", "subtitle", "audio", "speech", "talk",
                "presentation", "tutorial", "lecture", "youtube", "vimeo", "watch", "listen",
                "hear",
            ],
            &[
                r"\b(video|transcript|caption|subtitle)\b",
                r"\b(what does|what is said|what is mentioned)\b.*\b(video|audio)\b",
                r"\b(youtube|vimeo|watch|listen)\b",
            ],
        ),
        rules(
            Capability::Section,
            &[
                "documentation", "guide", "tutorial", "help", "manual", "instructions", "steps",
                "explanation", "description", "article", "blog", "post", "content", "text",
                "information",
            ],
            &[
                r"\b(documentation|guide|tutorial|help|manual)\b",
                r"\b(how to|what is|explain|describe)\b",
                r"\b(article|blog|post|content|information)\b",
            ],
        ),
        rules(
            Capability::ApiSpec,
            &[
                "api", "endpoint", "request", "response", "parameter", "authentication",
                "authorization", "token", "key", "swagger", "openapi", "rest", "graphql", "soap",
            ],
            &[
                r"\b(api|endpoint|request|response)\b",
                r"\b(how to|what is|use|call)\b.*\b(api|endpoint)\b",
                r"\b(swagger|openapi|rest|graphql)\b",
            ],
        ),
        rules(
            Capability::Manifest,
            &[
                "package", "dependency", "install", "requirements", "manifest", "config",
                "configuration", "setup", "environment", "version", "compatibility",
            ],
            &[
                r"\b(package|dependency|install|requirements)\b",
                r"\b(how to|what is|setup|configure)\b.*\b(package|dependency)\b",
                r"\b(manifest|config|configuration)\b",
            ],
        ),
        rules(
            Capability::Readme,
            &[
                "readme", "overview", "introduction", "setup", "installation", "usage",
                "example", "demo", "sample", "tutorial",
            ],
            &[
                r"\b(readme|overview|introduction|getting started)\b",
                r"\b(what is|explain|describe)\b.*\b(project|library|tool)\b",
                r"\b(setup|installation|usage|example)\b",
            ],
        ),
    ]
});

/// Question-type families, checked in this order.
static QUESTION_TYPES: LazyLock<Vec<(QuestionType, Regex)>> = LazyLock::new(|| {
    let families: [(QuestionType, &[&str]); 5] = [
        (
            QuestionType::HowTo,
            &["how to", "how do", "how can", "how should", "steps to", "way to", "process to"],
        ),
        (
            QuestionType::WhatIs,
            &[
                "what is", "what are", "what does", "what do", "explain", "describe", "define",
                "meaning of",
            ],
        ),
        (
            QuestionType::WhereIs,
            &["where is", "where are", "where can", "where do", "find", "locate", "located", "position"],
        ),
        (
            QuestionType::Why,
            &["why", "reason", "purpose", "benefit", "advantage", "disadvantage", "pros", "cons"],
        ),
        (
            QuestionType::When,
            &["when", "time", "schedule", "timeline", "deadline", "duration", "frequency"],
        ),
    ];
    families
        .into_iter()
        .map(|(kind, phrases)| {
            let alternation = phrases.join("|");
            let re = Regex::new(&format!(r"(?i)\b({alternation})\b")).unwrap();
            (kind, re)
        })
        .collect()
});

/// Capability weights used when nothing scores above the threshold.
fn fallback_weights(question_type: QuestionType) -> &'static [(Capability, f64)] {
    match question_type {
        QuestionType::HowTo => &[(Capability::Section, 0.6), (Capability::Readme, 0.4)],
        QuestionType::WhatIs => &[(Capability::Section, 0.7), (Capability::Readme, 0.3)],
        QuestionType::WhereIs => &[(Capability::NavGraph, 0.5), (Capability::Routes, 0.5)],
        QuestionType::Why => &[(Capability::Section, 0.8)],
        QuestionType::When => &[(Capability::Section, 0.6), (Capability::Manifest, 0.4)],
        QuestionType::General => &[(Capability::Section, 0.5), (Capability::Readme, 0.3)],
    }
}

fn type_boost(question_type: QuestionType) -> f64 {
    match question_type {
        QuestionType::HowTo | QuestionType::WhatIs => 0.1,
        QuestionType::WhereIs | QuestionType::Why | QuestionType::When => 0.05,
        QuestionType::General => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Plan a question. Never fails and always requires at least one capability.
#[instrument(skip_all, fields(chars = question.chars().count()))]
pub fn plan(question: &str) -> PlanningResult {
    let collapsed = collapse(question);
    let normalized = normalize(&collapsed);
    let keywords = extract_keywords(&normalized);
    let question_type = classify(&collapsed);

    let mut capability_scores = score_capabilities(&collapsed, &keywords);
    let mut required: Vec<(Capability, f64)> = capability_scores
        .iter()
        .filter(|(_, score)| **score > REQUIRED_THRESHOLD)
        .map(|(cap, score)| (*cap, *score))
        .collect();

    if required.is_empty() {
        required = fallback_weights(question_type).to_vec();
        for (cap, weight) in &required {
            capability_scores.insert(*cap, *weight);
        }
    }

    // Stable sort: equal scores keep capability order.
    required.sort_by(|a, b| b.1.total_cmp(&a.1));
    let confidence = confidence(&required, question_type, keywords.len());

    debug!(
        question_type = %question_type,
        keywords = ?keywords,
        required = ?required,
        confidence,
        "planned question"
    );

    PlanningResult {
        question: question.to_string(),
        normalized_question: normalized,
        keywords,
        required_capabilities: required.into_iter().map(|(cap, _)| cap).collect(),
        capability_scores,
        question_type,
        confidence,
    }
}

/// Lowercase and collapse whitespace.
fn collapse(question: &str) -> String {
    WHITESPACE_RE
        .replace_all(question.trim(), " ")
        .to_lowercase()
}

/// Drop normalization stop words from a collapsed question.
fn normalize(collapsed: &str) -> String {
    collapsed
        .split(' ')
        .filter(|w| !w.is_empty() && !NORMALIZE_STOP_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct words of three or more characters, in order of appearance.
fn extract_keywords(normalized: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for m in KEYWORD_RE.find_iter(normalized) {
        let word = m.as_str();
        if KEYWORD_STOP_WORDS.contains(&word) || keywords.iter().any(|k| k == word) {
            continue;
        }
        keywords.push(word.to_string());
    }
    keywords
}

fn classify(question: &str) -> QuestionType {
    QUESTION_TYPES
        .iter()
        .find(|(_, re)| re.is_match(question))
        .map(|(kind, _)| *kind)
        .unwrap_or(QuestionType::General)
}

fn score_capabilities(question: &str, keywords: &[String]) -> BTreeMap<Capability, f64> {
    CAPABILITY_RULES
        .iter()
        .map(|rule| {
            let keyword_matches = rule
                .keywords
                .iter()
                .filter(|k| keywords.iter().any(|w| w == *k))
                .count();
            let pattern_matches = rule.patterns.iter().filter(|p| p.is_match(question)).count();

            let mut score = keyword_matches as f64 * KEYWORD_WEIGHT
                + pattern_matches as f64 * PATTERN_WEIGHT;
            if keyword_matches > 1 {
                score += MULTI_MATCH_BONUS;
            }
            if pattern_matches > 1 {
                score += MULTI_MATCH_BONUS;
            }
            (rule.capability, score.clamp(0.0, 1.0))
        })
        .collect()
}

fn confidence(required: &[(Capability, f64)], question_type: QuestionType, keyword_count: usize) -> f64 {
    let Some(best) = required.iter().map(|(_, s)| *s).reduce(f64::max) else {
        return 0.1;
    };
    let keyword_boost = (keyword_count as f64 * 0.02).min(0.1);
    let capability_boost = (required.len() as f64 * 0.05).min(0.1);
    (best + type_boost(question_type) + keyword_boost + capability_boost).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_question_requires_api_spec_first() {
        let result = plan("What is the API endpoint for user authentication?");

        assert_eq!(result.question_type, QuestionType::WhatIs);
        assert_eq!(result.required_capabilities[0], Capability::ApiSpec);
        assert!(result.required_capabilities.contains(&Capability::CodeMap));
        assert_eq!(result.capability_scores[&Capability::ApiSpec], 1.0);
        assert!(result.keywords.contains(&"authentication".to_string()));
        assert!(result.confidence > 0.9 && result.confidence <= 1.0);
    }

    #[test]
    fn normalization_and_keywords() {
        let result = plan("  How   do I install the   Widgets CLI?  ");
        assert_eq!(result.normalized_question, "how do i install widgets cli?");
        assert_eq!(result.keywords, vec!["install", "widgets", "cli"]);
        assert_eq!(result.question_type, QuestionType::HowTo);
    }

    #[test]
    fn keywords_are_distinct_in_order_of_appearance() {
        let result = plan("cache invalidation cache layers invalidation");
        assert_eq!(result.keywords, vec!["cache", "invalidation", "layers"]);
    }

    #[test]
    fn question_types_follow_priority_order() {
        assert_eq!(plan("How can I find the logs?").question_type, QuestionType::HowTo);
        assert_eq!(plan("Where is the changelog?").question_type, QuestionType::WhereIs);
        assert_eq!(plan("Why does the build fail?").question_type, QuestionType::Why);
        assert_eq!(plan("When is the next release?").question_type, QuestionType::When);
        assert_eq!(plan("Pricing tiers").question_type, QuestionType::General);
    }

    #[test]
    fn unmatched_questions_fall_back_by_type() {
        let result = plan("Why does it matter?");
        assert_eq!(result.required_capabilities, vec![Capability::Section]);
        assert_eq!(result.capability_scores[&Capability::Section], 0.8);
        assert_eq!(result.weight_of(Capability::Section), 0.8);

        let result = plan("Pricing tiers");
        assert_eq!(
            result.required_capabilities,
            vec![Capability::Section, Capability::Readme]
        );
        assert!(!result.required_capabilities.is_empty());
    }

    #[test]
    fn empty_question_still_gets_a_plan() {
        let result = plan("");
        assert!(!result.required_capabilities.is_empty());
        assert_eq!(
            result.required_capabilities,
            vec![Capability::Section, Capability::Readme]
        );
        assert!(result.keywords.is_empty());
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn scores_are_clamped_and_bonused() {
        // Three keyword hits and two pattern hits on api_spec.
        let scores = score_capabilities(
            "api request response swagger",
            &["api".into(), "request".into(), "response".into()],
        );
        assert_eq!(scores[&Capability::ApiSpec], 1.0);

        // One keyword and one pattern: 0.3 + 0.4.
        let scores = score_capabilities("video", &["video".into()]);
        assert!((scores[&Capability::Transcript] - 0.7).abs() < 1e-9);
        assert_eq!(scores[&Capability::Manifest], 0.0);
    }

    #[test]
    fn confidence_formula() {
        // 0.7 + 0.1 (how_to) + 0.06 (3 keywords) + 0.05 (one capability)
        let c = confidence(&[(Capability::Section, 0.7)], QuestionType::HowTo, 3);
        assert!((c - 0.91).abs() < 1e-9);
        assert_eq!(confidence(&[], QuestionType::General, 0), 0.1);
        let capped = confidence(&[(Capability::Section, 1.0)], QuestionType::HowTo, 10);
        assert_eq!(capped, 1.0);
    }

    #[test]
    fn planning_is_deterministic() {
        let a = plan("How to use the navigation menu?");
        let b = plan("How to use the navigation menu?");
        assert_eq!(a.required_capabilities, b.required_capabilities);
        assert_eq!(a.keywords, b.keywords);
        assert_eq!(a.confidence, b.confidence);
    }
}
