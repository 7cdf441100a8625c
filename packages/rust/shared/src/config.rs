//! Application configuration for SiteQuery.
//!
//! User config lives at `~/.sitequery/sitequery.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteQueryError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitequery.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitequery";

/// User-Agent sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("SiteQuery/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Config structs (matching sitequery.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crawl limits and politeness.
    #[serde(default)]
    pub crawl: CrawlSection,

    /// Content-block admission rules.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Link/text ranking.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Final selection.
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_page_budget")]
    pub page_budget: usize,

    #[serde(default = "default_char_budget")]
    pub char_budget: usize,

    #[serde(default = "default_per_page_timeout")]
    pub per_page_timeout_secs: u64,

    #[serde(default = "default_global_timeout")]
    pub global_timeout_secs: u64,

    /// Whether to honour robots.txt.
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            page_budget: default_page_budget(),
            char_budget: default_char_budget(),
            per_page_timeout_secs: default_per_page_timeout(),
            global_timeout_secs: default_global_timeout(),
            respect_robots: true,
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_depth() -> u32 {
    1
}
fn default_page_budget() -> usize {
    8
}
fn default_char_budget() -> usize {
    10_000
}
fn default_per_page_timeout() -> u64 {
    10
}
fn default_global_timeout() -> u64 {
    75
}
fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Blocks shorter than this (in characters) are rejected.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Blocks scoring below this are rejected.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Pages larger than this many bytes are not extracted.
    #[serde(default = "default_max_content_size")]
    pub max_content_size: usize,

    /// Upper bound for one text section.
    #[serde(default = "default_max_section_chars")]
    pub max_section_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_content_length: default_min_content_length(),
            quality_threshold: default_quality_threshold(),
            max_content_size: default_max_content_size(),
            max_section_chars: default_max_section_chars(),
        }
    }
}

fn default_min_content_length() -> usize {
    100
}
fn default_quality_threshold() -> f64 {
    0.3
}
fn default_max_content_size() -> usize {
    1024 * 1024
}
fn default_max_section_chars() -> usize {
    2000
}

/// Which text ranker scores links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankerKind {
    #[default]
    Bm25,
    Tfidf,
}

/// `[ranking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default)]
    pub ranker: RankerKind,

    /// BM25 term-frequency saturation.
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,

    /// BM25 length normalization.
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            ranker: RankerKind::default(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
        }
    }
}

fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}

/// `[assembly]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Token-Jaccard similarity above which two blocks are duplicates.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,

    /// Optional cap on relevance-ranked blocks before coverage repair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blocks: Option<usize>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: default_dedup_threshold(),
            max_blocks: None,
        }
    }
}

fn default_dedup_threshold() -> f64 {
    0.8
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime limits for one crawl session. Supplied once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlConfig {
    /// Maximum link distance from the seed (0-10).
    pub max_depth: u32,
    /// Maximum pages fetched (1-100).
    pub page_budget: usize,
    /// Maximum characters assembled (1,000-100,000).
    pub char_budget: usize,
    /// Per-request timeout (1-60s).
    pub per_page_timeout: Duration,
    /// Session deadline (10-300s).
    pub global_timeout: Duration,
    pub respect_robots: bool,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&CrawlSection::default())
    }
}

impl From<&CrawlSection> for CrawlConfig {
    fn from(section: &CrawlSection) -> Self {
        Self {
            max_depth: section.max_depth,
            page_budget: section.page_budget,
            char_budget: section.char_budget,
            per_page_timeout: Duration::from_secs(section.per_page_timeout_secs),
            global_timeout: Duration::from_secs(section.global_timeout_secs),
            respect_robots: section.respect_robots,
            user_agent: section.user_agent.clone(),
        }
    }
}

impl TryFrom<&AppConfig> for CrawlConfig {
    type Error = SiteQueryError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let crawl = Self::from(&config.crawl);
        crawl.validate()?;
        Ok(crawl)
    }
}

impl CrawlConfig {
    /// Check every limit against its allowed range.
    pub fn validate(&self) -> Result<()> {
        check_range("max_depth", self.max_depth as u64, 0, 10)?;
        check_range("page_budget", self.page_budget as u64, 1, 100)?;
        check_range("char_budget", self.char_budget as u64, 1_000, 100_000)?;
        check_secs("per_page_timeout", self.per_page_timeout, 1, 60)?;
        check_secs("global_timeout", self.global_timeout, 10, 300)?;
        if self.user_agent.trim().is_empty() {
            return Err(SiteQueryError::config("user_agent must not be empty"));
        }
        Ok(())
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(SiteQueryError::config(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

fn check_secs(name: &str, value: Duration, min: u64, max: u64) -> Result<()> {
    if value < Duration::from_secs(min) || value > Duration::from_secs(max) {
        return Err(SiteQueryError::config(format!(
            "{name} must be between {min}s and {max}s, got {:.1}s",
            value.as_secs_f64()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitequery/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteQueryError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitequery/sitequery.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteQueryError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteQueryError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteQueryError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteQueryError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteQueryError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
