//! Relevance scoring of text spans and candidate links.
//!
//! Batch ranking is pluggable through [`TextRanker`]; the ranker is picked
//! once, when a [`LinkScorer`] is built, from [`RankerKind`] in the config.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use sitequery_shared::{RankerKind, RankingConfig};

use crate::text::{tokenize, url_keywords};

/// Multipliers for well-known URL path shapes. First match wins.
static PATH_BOOSTS: LazyLock<Vec<(Regex, f64)>> = LazyLock::new(|| {
    [
        (r"(?i)/api/", 1.5),
        (r"(?i)/docs?/", 1.3),
        (r"(?i)/documentation/", 1.3),
        (r"(?i)/guide/", 1.2),
        (r"(?i)/tutorial/", 1.2),
        (r"(?i)/help/", 1.1),
        (r"(?i)/about/", 0.8),
        (r"(?i)/contact/", 0.5),
    ]
    .into_iter()
    .map(|(pattern, boost)| (Regex::new(pattern).unwrap(), boost))
    .collect()
});

/// Saturation constant for single-span term weighting.
const SPAN_K1: f64 = 1.2;
/// Added when the joined keywords appear verbatim in the link text.
const PHRASE_BONUS: f64 = 2.0;
/// Added per question keyword found in the URL.
const URL_MATCH_BONUS: f64 = 0.5;

// ---------------------------------------------------------------------------
// Rankers
// ---------------------------------------------------------------------------

/// Scores a batch of tokenized documents against a query.
///
/// Implementations must be pure: the same batch and query always produce the
/// same scores, one per document, in document order.
pub trait TextRanker: Send + Sync {
    /// Human-readable ranker name for tracing.
    fn name(&self) -> &'static str;

    fn score_batch(&self, docs: &[Vec<String>], query: &[String]) -> Vec<f64>;
}

/// Okapi BM25 over the batch as its own corpus.
#[derive(Debug, Clone)]
pub struct Bm25Ranker {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Ranker {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl TextRanker for Bm25Ranker {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn score_batch(&self, docs: &[Vec<String>], query: &[String]) -> Vec<f64> {
        if docs.is_empty() {
            return Vec::new();
        }

        let n = docs.len() as f64;
        let avg_len = docs.iter().map(Vec::len).sum::<usize>() as f64 / n;
        let doc_freq = document_frequencies(docs);

        docs.iter()
            .map(|doc| {
                let counts = term_counts(doc);
                let len_norm = if avg_len > 0.0 {
                    1.0 - self.b + self.b * doc.len() as f64 / avg_len
                } else {
                    1.0
                };
                distinct(query)
                    .filter_map(|term| {
                        let tf = *counts.get(term)? as f64;
                        let df = *doc_freq.get(term.as_str()).unwrap_or(&0) as f64;
                        // Lucene-style idf stays positive for terms in every document.
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        Some(idf * tf * (self.k1 + 1.0) / (tf + self.k1 * len_norm))
                    })
                    .sum()
            })
            .collect()
    }
}

/// Deterministic TF-IDF style ranker.
#[derive(Debug, Clone, Default)]
pub struct TfIdfRanker;

impl TextRanker for TfIdfRanker {
    fn name(&self) -> &'static str {
        "tfidf"
    }

    fn score_batch(&self, docs: &[Vec<String>], query: &[String]) -> Vec<f64> {
        let n = docs.len() as f64;
        let doc_freq = document_frequencies(docs);
        let query_counts = term_counts(query);

        docs.iter()
            .map(|doc| {
                if doc.is_empty() {
                    return 0.0;
                }
                let counts = term_counts(doc);
                distinct(query)
                    .filter_map(|term| {
                        let query_freq = query_counts.get(term).copied().unwrap_or(0);
                        let tf_raw = *counts.get(term)? as f64;
                        let tf = 1.0 + tf_raw / doc.len() as f64;
                        let df = *doc_freq.get(term.as_str()).unwrap_or(&0) as f64;
                        let idf = 1.0 + n / (1.0 + df);
                        Some(query_freq as f64 * tf * idf)
                    })
                    .sum()
            })
            .collect()
    }
}

/// Build the ranker named by the config.
pub fn ranker_for(config: &RankingConfig) -> Box<dyn TextRanker> {
    match config.ranker {
        RankerKind::Bm25 => Box::new(Bm25Ranker {
            k1: config.bm25_k1,
            b: config.bm25_b,
        }),
        RankerKind::Tfidf => Box::new(TfIdfRanker),
    }
}

fn term_counts(tokens: &[String]) -> HashMap<&String, usize> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn document_frequencies(docs: &[Vec<String>]) -> HashMap<&str, usize> {
    let mut freq = HashMap::new();
    for doc in docs {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *freq.entry(term).or_insert(0) += 1;
        }
    }
    freq
}

fn distinct(terms: &[String]) -> impl Iterator<Item = &String> {
    let mut seen = HashSet::new();
    terms.iter().filter(move |t| seen.insert(t.as_str()))
}

// ---------------------------------------------------------------------------
// Span and link scores
// ---------------------------------------------------------------------------

/// BM25-style weight of `keywords` in a single span of text.
pub fn score_text(text: &str, keywords: &[String]) -> f64 {
    let tokens = tokenize(text);
    span_term_score(&tokens, keywords)
}

fn span_term_score(tokens: &[String], keywords: &[String]) -> f64 {
    if tokens.is_empty() || keywords.is_empty() {
        return 0.0;
    }
    let counts = term_counts(tokens);
    let query_counts = term_counts(keywords);
    // Iterate in keyword order so the float sum is reproducible.
    distinct(keywords)
        .filter_map(|term| {
            let freq = query_counts.get(term).copied().unwrap_or(0) as f64;
            let tf = *counts.get(term)? as f64;
            Some(freq * (tf / (tf + SPAN_K1)) * (1.0 + 0.75))
        })
        .sum()
}

/// Multiplier for the first matching path pattern, `1.0` when none match.
pub fn path_boost(url: &Url) -> f64 {
    PATH_BOOSTS
        .iter()
        .find(|(re, _)| re.is_match(url.as_str()))
        .map(|(_, boost)| *boost)
        .unwrap_or(1.0)
}

/// Phrase bonus, URL-keyword bonus, depth penalty and path boost around a
/// base term score.
fn adjust(
    base: f64,
    link_text: &str,
    url: &Url,
    url_words: &[String],
    keywords: &[String],
    depth: u32,
) -> f64 {
    let mut score = base;

    if !keywords.is_empty() && !link_text.is_empty() {
        let phrase = keywords.join(" ").to_lowercase();
        if link_text.to_lowercase().contains(&phrase) {
            score += PHRASE_BONUS;
        }
    }

    let url_matches = keywords.iter().filter(|k| url_words.contains(k)).count();
    score += url_matches as f64 * URL_MATCH_BONUS;

    if depth > 0 {
        score *= 0.5_f64.powi(depth as i32);
    }

    (score * path_boost(url)).max(0.0)
}

/// Relevance of one link to the question keywords.
pub fn link_score(link_text: &str, url: &Url, keywords: &[String], depth: u32) -> f64 {
    let url_words = url_keywords(url);
    let mut tokens = tokenize(link_text);
    tokens.extend(url_words.iter().cloned());
    let base = span_term_score(&tokens, keywords);
    adjust(base, link_text, url, &url_words, keywords, depth)
}

/// The text a link offers for scoring.
#[derive(Debug, Clone)]
pub struct LinkText<'a> {
    pub text: &'a str,
    pub title: &'a str,
    pub url: &'a Url,
    pub depth: u32,
}

/// Scores links found on one page as a batch, with the configured ranker.
pub struct LinkScorer {
    ranker: Box<dyn TextRanker>,
}

impl LinkScorer {
    pub fn new(ranker: Box<dyn TextRanker>) -> Self {
        Self { ranker }
    }

    pub fn from_config(config: &RankingConfig) -> Self {
        Self::new(ranker_for(config))
    }

    pub fn ranker_name(&self) -> &'static str {
        self.ranker.name()
    }

    /// One score per link, in input order.
    pub fn score_links(&self, links: &[LinkText<'_>], keywords: &[String]) -> Vec<f64> {
        if links.is_empty() {
            return Vec::new();
        }
        if keywords.is_empty() {
            return vec![0.0; links.len()];
        }

        let url_words: Vec<Vec<String>> = links.iter().map(|l| url_keywords(l.url)).collect();
        let docs: Vec<Vec<String>> = links
            .iter()
            .zip(&url_words)
            .map(|(link, words)| {
                let mut doc = tokenize(&format!("{} {}", link.text, link.title));
                doc.extend(words.iter().cloned());
                doc
            })
            .collect();

        let base = self.ranker.score_batch(&docs, keywords);
        links
            .iter()
            .zip(&url_words)
            .zip(base)
            .map(|((link, words), base)| {
                adjust(base, link.text, link.url, words, keywords, link.depth)
            })
            .collect()
    }
}

impl Default for LinkScorer {
    fn default() -> Self {
        Self::new(Box::new(Bm25Ranker::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn score_text_is_pure() {
        let keywords = kw(&["api", "authentication"]);
        let text = "The authentication API issues tokens. Call the API with a key.";
        let first = score_text(text, &keywords);
        let second = score_text(text, &keywords);
        assert_eq!(first, second);
        assert!(first > 0.0);
        assert_eq!(score_text("nothing relevant here", &keywords), 0.0);
    }

    #[test]
    fn path_boost_takes_first_match() {
        assert_eq!(path_boost(&url("https://a.test/api/docs/x")), 1.5);
        assert_eq!(path_boost(&url("https://a.test/doc/intro")), 1.3);
        assert_eq!(path_boost(&url("https://a.test/contact/")), 0.5);
        assert_eq!(path_boost(&url("https://a.test/blog/post")), 1.0);
    }

    #[test]
    fn depth_halves_the_score() {
        let keywords = kw(&["install"]);
        let target = url("https://a.test/setup/install");
        let shallow = link_score("Install", &target, &keywords, 0);
        let deep = link_score("Install", &target, &keywords, 1);
        assert!(shallow > 0.0);
        assert!((deep - shallow * 0.5).abs() < 1e-9);
    }

    #[test]
    fn phrase_match_adds_bonus() {
        let keywords = kw(&["rate", "limits"]);
        let target = url("https://a.test/x");
        let with_phrase = link_score("Rate limits explained", &target, &keywords, 0);
        let without = link_score("Limits on the rate", &target, &keywords, 0);
        assert!((with_phrase - without - PHRASE_BONUS).abs() < 1e-9);
    }

    #[test]
    fn relevant_links_outrank_irrelevant_ones() {
        let keywords = kw(&["api"]);
        let api = url("https://a.test/api/reference");
        let contact = url("https://a.test/contact");
        let privacy = url("https://a.test/privacy");
        let links = [
            LinkText { text: "Contact us", title: "", url: &contact, depth: 1 },
            LinkText { text: "API reference", title: "", url: &api, depth: 1 },
            LinkText { text: "Privacy", title: "", url: &privacy, depth: 1 },
        ];

        for scorer in [LinkScorer::default(), LinkScorer::new(Box::new(TfIdfRanker))] {
            let scores = scorer.score_links(&links, &keywords);
            assert_eq!(scores.len(), 3);
            assert!(scores[1] > scores[0], "{}", scorer.ranker_name());
            assert_eq!(scores[0], 0.0);
            assert_eq!(scores[2], 0.0);
        }
    }

    #[test]
    fn bm25_prefers_rarer_terms() {
        let docs = vec![kw(&["api", "guide"]), kw(&["api", "tokens"]), kw(&["api", "errors"])];
        let scores = Bm25Ranker::default().score_batch(&docs, &kw(&["api", "tokens"]));
        assert!(scores[1] > scores[0]);
        assert!((scores[0] - scores[2]).abs() < 1e-9);
    }

    #[test]
    fn ranker_follows_config() {
        let mut config = RankingConfig::default();
        assert_eq!(ranker_for(&config).name(), "bm25");
        config.ranker = RankerKind::Tfidf;
        assert_eq!(ranker_for(&config).name(), "tfidf");
    }
}
