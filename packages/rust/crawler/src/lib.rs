//! Question-driven web navigation and content extraction.
//!
//! This crate provides:
//! - [`navigator`]: budget-bounded, priority-ordered crawl sessions
//! - [`adapters`]: format-specific extraction into content blocks
//! - [`frontier`], [`robots`], [`retry`], [`scope`]: the session's building blocks

pub mod adapters;
pub mod frontier;
pub mod navigator;
pub mod retry;
pub mod robots;
pub mod scope;

pub use adapters::{
    AdapterRegistry, Document, Extraction, ExtractionAdapter, HtmlAdapter, MIN_CONFIDENCE,
    TextAdapter,
};
pub use frontier::{Frontier, Rejection};
pub use navigator::{FetchedPage, NavigationResult, NavigationSession, Navigator, SessionState};
pub use retry::RetryPolicy;
pub use robots::{RobotsCache, RobotsRules};
pub use scope::{CrawlScope, is_denied, is_ssrf_target, normalize_link, normalize_url};
