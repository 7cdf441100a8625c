//! Relevance scoring and near-duplicate detection for SiteQuery.
//!
//! Everything here is a pure function of its inputs:
//! - [`text`]: tokenization and URL keyword extraction
//! - [`scorer`]: pluggable batch rankers and the link score
//! - [`fingerprint`]: 64-bit simhash, Hamming test, token Jaccard

pub mod fingerprint;
pub mod scorer;
pub mod text;

pub use fingerprint::{
    NEAR_DUPLICATE_BITS, hamming_distance, is_near_duplicate, jaccard, simhash, token_set,
};
pub use scorer::{
    Bm25Ranker, LinkScorer, LinkText, TextRanker, TfIdfRanker, link_score, path_boost, ranker_for,
    score_text,
};
pub use text::{tokenize, url_keywords};
