//! Shared types, error model, and configuration for SiteQuery.
//!
//! This crate is the foundation depended on by all other SiteQuery crates.
//! It provides:
//! - [`SiteQueryError`]: the unified error type
//! - Domain types ([`Capability`], [`ContentType`], [`PlanningResult`], [`AssemblyResult`], ...)
//! - [`ContentBlock`] and the [`BlockPolicy`] that admits it
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod block;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use block::{BlockPolicy, ContentBlock, ELLIPSIS};
pub use config::{
    AppConfig, AssemblyConfig, CrawlConfig, CrawlSection, DEFAULT_USER_AGENT, ExtractionConfig,
    RankerKind, RankingConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{Result, SiteQueryError};
pub use types::{
    AssemblyResult, AssemblyStats, Capability, Citation, ContentType, LinkCandidate,
    NavigationStats, PlanningResult, QuestionType,
};
