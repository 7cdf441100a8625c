//! Content fingerprints for near-duplicate suppression.
//!
//! A fingerprint is a 64-bit simhash: every token votes on each bit with its
//! own hash, and a bit is set when more tokens voted for it than against.
//! Texts without any scorable token fingerprint to `0`, which never matches
//! anything.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::text::tokenize;

/// Maximum Hamming distance at which two fingerprints are near-duplicates.
pub const NEAR_DUPLICATE_BITS: u32 = 3;

/// 64-bit simhash of the tokenized text.
pub fn simhash(text: &str) -> u64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0;
    }

    let mut votes = [0i32; 64];
    for token in &tokens {
        let h = token_hash(token);
        for (i, vote) in votes.iter_mut().enumerate() {
            if (h >> i) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }

    let mut fingerprint: u64 = 0;
    for (i, vote) in votes.iter().enumerate() {
        if *vote > 0 {
            fingerprint |= 1 << i;
        }
    }
    fingerprint
}

fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Count differing bits between two fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Whether two fingerprints are within `max_bits` of each other.
///
/// A zero fingerprint carries no information and is never a duplicate.
pub fn is_near_duplicate(a: u64, b: u64, max_bits: u32) -> bool {
    if a == 0 || b == 0 {
        return false;
    }
    hamming_distance(a, b) <= max_bits
}

/// The distinct tokens of a text.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard similarity of two token sets; `0.0` if either is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_identical_fingerprint() {
        let text = "Authenticate requests with a bearer token in the header";
        assert_eq!(simhash(text), simhash(text));
        assert_ne!(simhash(text), 0);
    }

    #[test]
    fn fingerprint_ignores_case_and_stop_words() {
        assert_eq!(
            simhash("The Quick Brown Fox"),
            simhash("quick brown fox")
        );
    }

    #[test]
    fn empty_text_never_matches() {
        assert_eq!(simhash(""), 0);
        assert_eq!(simhash("a 1 2 3"), 0);
        assert!(!is_near_duplicate(0, 0, NEAR_DUPLICATE_BITS));
        assert!(!is_near_duplicate(0, simhash("some words"), 64));
    }

    #[test]
    fn hamming_threshold() {
        let a = 0b1011_0000u64 << 8;
        assert!(is_near_duplicate(a, a ^ 0b111, NEAR_DUPLICATE_BITS));
        assert!(!is_near_duplicate(a, a ^ 0b1111, NEAR_DUPLICATE_BITS));
        assert_eq!(hamming_distance(a, a ^ 0b1111), 4);
    }

    #[test]
    fn unrelated_texts_are_far_apart() {
        let a = simhash("installation guide package manager setup");
        let b = simhash("quarterly revenue marketing budget forecast");
        assert!(hamming_distance(a, b) > NEAR_DUPLICATE_BITS);
    }

    #[test]
    fn jaccard_over_token_sets() {
        let a = token_set("alpha beta gamma delta");
        let b = token_set("delta gamma beta alpha");
        let c = token_set("alpha beta epsilon zeta");
        assert_eq!(jaccard(&a, &b), 1.0);
        assert!((jaccard(&a, &c) - 2.0 / 6.0).abs() < 1e-9);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
    }
}
