//! Tokenization shared by the rankers and the fingerprinter.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Alphabetic runs of two or more letters.
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{2,}\b").unwrap());

static EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(html?|php|asp|jsp|py|js|css)$").unwrap());

static CAMEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
        "did", "will", "would", "could", "should", "may", "might", "must", "can", "this", "that",
        "these", "those", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
        "them",
    ]
    .into_iter()
    .collect()
});

/// Lowercased alphabetic tokens with stop words removed, in text order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Words found in a URL's path segments, query pairs and fragment.
///
/// File extensions are dropped and camelCase / snake_case segments are split,
/// so `/docs/getStarted_guide.html?lang=en` yields
/// `["docs", "get", "started", "guide", "lang", "en"]`.
pub fn url_keywords(url: &Url) -> Vec<String> {
    let mut parts: Vec<String> = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|seg| !seg.is_empty() && !seg.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect();

    for (name, value) in url.query_pairs() {
        parts.push(name.into_owned());
        if !value.is_empty() && !value.chars().all(|c| c.is_ascii_digit()) {
            parts.push(value.into_owned());
        }
    }

    if let Some(fragment) = url.fragment() {
        parts.extend(
            fragment
                .split('-')
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );
    }

    let mut words = Vec::new();
    for part in parts {
        let part = EXTENSION_RE.replace(&part, "");
        let part = CAMEL_RE.replace_all(&part, "$1 $2");
        let part = part.replace('_', " ").to_lowercase();
        words.extend(WORD_RE.find_iter(&part).map(|m| m.as_str().to_string()));
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stop_words_and_short_tokens() {
        let tokens = tokenize("How do I call the Payments API? It is a v2 REST endpoint.");
        assert_eq!(
            tokens,
            vec!["how", "call", "payments", "api", "rest", "endpoint"]
        );
    }

    #[test]
    fn tokenize_empty_text() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   42 7 ").is_empty());
    }

    #[test]
    fn url_keywords_split_path_query_and_fragment() {
        let url =
            Url::parse("https://example.com/docs/getStarted_guide.html?lang=en&page=2#auth-tokens")
                .unwrap();
        assert_eq!(
            url_keywords(&url),
            vec!["docs", "get", "started", "guide", "lang", "en", "page", "auth", "tokens"]
        );
    }

    #[test]
    fn url_keywords_skip_numeric_segments() {
        let url = Url::parse("https://example.com/blog/2024/05/release-notes").unwrap();
        assert_eq!(url_keywords(&url), vec!["blog", "release", "notes"]);
    }
}
