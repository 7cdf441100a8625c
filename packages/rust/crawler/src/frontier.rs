//! Budget-bounded priority frontier for one navigation session.
//!
//! Candidates are ordered by `(score, discovery order)` on a binary heap:
//! higher scores first, and among equal scores the earlier discovery wins.
//! A URL that has been queued or visited once is never admitted again.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use sitequery_shared::LinkCandidate;

/// Why a candidate was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The URL was already queued or visited in this session.
    Duplicate,
    /// The queue already holds `page_budget` live candidates.
    QueueFull,
}

struct Entry {
    score: f64,
    seq: u64,
    candidate: LinkCandidate,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: larger score first, then smaller sequence number first.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of link candidates with a hard capacity.
pub struct Frontier {
    heap: BinaryHeap<Entry>,
    /// URLs queued or visited at any point in the session.
    seen: HashSet<String>,
    capacity: usize,
    next_seq: u64,
    admitted: usize,
}

impl Frontier {
    /// An empty frontier holding at most `capacity` live candidates.
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
            capacity,
            next_seq: 0,
            admitted: 0,
        }
    }

    /// A frontier holding only `seed`, queued above any scored candidate.
    pub fn seeded(capacity: usize, mut seed: LinkCandidate) -> Self {
        let mut frontier = Self::new(capacity);
        seed.score = f64::INFINITY;
        frontier.seen.insert(seed.url.to_string());
        frontier.enqueue(seed);
        frontier
    }

    /// Admit one candidate if it is new and there is room.
    pub fn push(&mut self, candidate: LinkCandidate) -> Result<(), Rejection> {
        if self.seen.contains(candidate.url.as_str()) {
            return Err(Rejection::Duplicate);
        }
        if self.heap.len() >= self.capacity {
            return Err(Rejection::QueueFull);
        }
        self.seen.insert(candidate.url.to_string());
        self.enqueue(candidate);
        Ok(())
    }

    fn enqueue(&mut self, candidate: LinkCandidate) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.admitted += 1;
        self.heap.push(Entry {
            score: candidate.score,
            seq,
            candidate,
        });
    }

    /// Admit one page's links as a unit: best score first, discovery order
    /// breaking ties, until the queue is full. Returns how many were admitted.
    pub fn admit_batch(&mut self, mut batch: Vec<LinkCandidate>) -> usize {
        // Stable sort keeps discovery order among equal scores.
        batch.sort_by(|a, b| b.score.total_cmp(&a.score));
        let mut admitted = 0;
        for candidate in batch {
            match self.push(candidate) {
                Ok(()) => admitted += 1,
                Err(Rejection::Duplicate) => {}
                Err(Rejection::QueueFull) => break,
            }
        }
        admitted
    }

    /// Remove and return the best candidate.
    pub fn pop(&mut self) -> Option<LinkCandidate> {
        self.heap.pop().map(|entry| entry.candidate)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Live candidates.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Total candidates ever admitted, seed included.
    pub fn admitted(&self) -> usize {
        self.admitted
    }

    /// Mean score of the finite-scored live candidates.
    pub fn average_score(&self) -> f64 {
        let (sum, count) = self
            .heap
            .iter()
            .filter(|e| e.score.is_finite())
            .fold((0.0, 0usize), |(sum, count), e| (sum + e.score, count + 1));
        if count == 0 { 0.0 } else { sum / count as f64 }
    }
}
