//! Question-driven navigation: one budget-bounded crawl session per question.
//!
//! A [`Navigator`] holds the HTTP client and session-independent settings.
//! [`Navigator::navigate`] opens a [`NavigationSession`], which is a
//! single-use, pull-driven sequence of fetched pages: each call to
//! [`NavigationSession::next_page`] pops the best candidate, fetches it,
//! scores and admits its links, and hands the page back.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use sitequery_relevance::{
    LinkScorer, LinkText, NEAR_DUPLICATE_BITS, is_near_duplicate, simhash, url_keywords,
};
use sitequery_shared::{
    Capability, CrawlConfig, LinkCandidate, NavigationStats, Result, SiteQueryError,
};

use crate::frontier::Frontier;
use crate::retry::{RetryPolicy, retry};
use crate::robots::RobotsCache;
use crate::scope::{CrawlScope, is_ssrf_target, normalize_link, normalize_url};

static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Pages between two progress log lines.
const STATS_LOG_INTERVAL: usize = 5;

/// Longest parent text used as a link description.
const MAX_CONTEXT_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Session records
// ---------------------------------------------------------------------------

/// Lifecycle of one navigation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// The frontier ran dry.
    Completed,
    /// The global deadline passed before the next fetch.
    TimedOut,
    /// `page_budget` pages were fetched.
    BudgetExhausted,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::BudgetExhausted)
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub content: String,
    /// The `Content-Type` header, if any.
    pub content_type: Option<String>,
    pub byte_length: usize,
    pub depth: u32,
    /// Queue score the page was admitted with; `0.0` for the seed.
    pub score: f64,
    pub fetched_at: DateTime<Utc>,
    /// SHA-256 of the body, hex encoded.
    pub content_hash: String,
}

/// Summary of a finished (or abandoned) session.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationResult {
    pub session_id: String,
    pub seed: Url,
    /// Every URL a fetch was attempted for, in visit order.
    pub visited: Vec<Url>,
    /// Final queue-observed score per visited URL.
    pub url_scores: BTreeMap<String, f64>,
    pub required_capabilities: Vec<Capability>,
    pub stats: NavigationStats,
    pub state: SessionState,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl NavigationResult {
    /// Score observed for `url`, `0.0` if it was never scored.
    pub fn score_of(&self, url: &Url) -> f64 {
        self.url_scores.get(url.as_str()).copied().unwrap_or(0.0)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

/// Opens navigation sessions with a shared HTTP client.
pub struct Navigator {
    config: CrawlConfig,
    client: Client,
    scorer: LinkScorer,
    retry: RetryPolicy,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private: bool,
}

impl Navigator {
    /// Create a navigator after validating `config`.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.per_page_timeout)
            .build()
            .map_err(|e| SiteQueryError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            scorer: LinkScorer::default(),
            retry: RetryPolicy::default(),
            allow_private: false,
        })
    }

    /// Allow crawling localhost/private IPs.
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private = allow;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_link_scorer(mut self, scorer: LinkScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Open a session rooted at `seed`.
    ///
    /// Nothing is fetched until the first [`NavigationSession::next_page`].
    #[instrument(skip_all, fields(seed = %seed, keywords = keywords.len()))]
    pub fn navigate(
        &self,
        seed: &Url,
        keywords: &[String],
        required_capabilities: &[Capability],
    ) -> Result<NavigationSession<'_>> {
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(SiteQueryError::validation(format!(
                "seed URL must be http or https: {seed}"
            )));
        }
        if !self.allow_private && is_ssrf_target(seed) {
            return Err(SiteQueryError::validation(format!(
                "refusing to crawl private or local address: {seed}"
            )));
        }

        let seed = normalize_url(seed);
        let frontier = Frontier::seeded(
            self.config.page_budget,
            LinkCandidate {
                url: seed.clone(),
                anchor_text: String::new(),
                title: String::new(),
                score: 0.0,
                depth: 0,
                parent_url: None,
            },
        );

        Ok(NavigationSession {
            navigator: self,
            id: Uuid::now_v7(),
            scope: CrawlScope::new(&seed, self.allow_private),
            seed,
            keywords: keywords.to_vec(),
            required_capabilities: required_capabilities.to_vec(),
            frontier,
            visited: Vec::new(),
            observed_scores: BTreeMap::new(),
            fingerprints: Vec::new(),
            robots: RobotsCache::new(),
            stats: NavigationStats::default(),
            state: SessionState::Idle,
            started: None,
            deadline: None,
            elapsed: None,
        })
    }
}

// ---------------------------------------------------------------------------
// NavigationSession
// ---------------------------------------------------------------------------

/// A single-use crawl session. Pull pages with [`next_page`](Self::next_page).
pub struct NavigationSession<'a> {
    navigator: &'a Navigator,
    id: Uuid,
    seed: Url,
    scope: CrawlScope,
    keywords: Vec<String>,
    required_capabilities: Vec<Capability>,
    /// Every URL ever queued, visited ones included.
    frontier: Frontier,
    visited: Vec<Url>,
    /// Score each URL was admitted with. The seed is never recorded.
    observed_scores: BTreeMap<String, f64>,
    /// Fingerprints of every candidate admitted to link scoring so far.
    fingerprints: Vec<u64>,
    robots: RobotsCache,
    stats: NavigationStats,
    state: SessionState,
    started: Option<Instant>,
    deadline: Option<Instant>,
    elapsed: Option<Duration>,
}

impl NavigationSession<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &NavigationStats {
        &self.stats
    }

    /// Fetch the next page, or `None` once the session has finished.
    ///
    /// Fetch failures are counted in the stats and skipped; they never end
    /// the session.
    pub async fn next_page(&mut self) -> Option<FetchedPage> {
        match self.state {
            SessionState::Idle => self.start(),
            SessionState::Running => {}
            _ => return None,
        }

        let navigator = self.navigator;
        let config = &navigator.config;
        loop {
            if self.stats.urls_visited >= config.page_budget {
                self.finish(SessionState::BudgetExhausted);
                return None;
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                self.finish(SessionState::TimedOut);
                return None;
            }
            let Some(candidate) = self.frontier.pop() else {
                self.finish(SessionState::Completed);
                return None;
            };
            self.stats.urls_queued = self.frontier.len();
            self.stats.avg_score = self.frontier.average_score();

            if config.respect_robots
                && !self
                    .robots
                    .can_fetch(&navigator.client, &config.user_agent, &candidate.url)
                    .await
            {
                debug!(url = %candidate.url, "disallowed by robots.txt");
                continue;
            }

            self.visited.push(candidate.url.clone());

            let page = match self.fetch(&candidate).await {
                Ok(page) => page,
                Err(e) => {
                    self.stats.errors += 1;
                    warn!(url = %candidate.url, error = %e, "fetch failed");
                    continue;
                }
            };

            self.stats.urls_visited += 1;
            self.stats.bytes_fetched += page.byte_length as u64;
            self.stats.depth_reached = self.stats.depth_reached.max(page.depth);

            if page.depth < config.max_depth && self.stats.urls_visited < config.page_budget {
                self.admit_links(&page);
            }

            if self.stats.urls_visited % STATS_LOG_INTERVAL == 0 {
                info!(
                    session = %self.id,
                    visited = self.stats.urls_visited,
                    queued = self.stats.urls_queued,
                    bytes = self.stats.bytes_fetched,
                    depth = self.stats.depth_reached,
                    "navigation progress"
                );
            }
            return Some(page);
        }
    }

    /// Consume the session into its summary.
    pub fn into_result(self) -> NavigationResult {
        let url_scores = self
            .visited
            .iter()
            .map(|url| {
                let score = self.observed_scores.get(url.as_str()).copied().unwrap_or(0.0);
                (url.to_string(), score)
            })
            .collect();
        let elapsed = self
            .elapsed
            .or_else(|| self.started.map(|s| s.elapsed()))
            .unwrap_or_default();

        NavigationResult {
            session_id: self.id.to_string(),
            seed: self.seed,
            visited: self.visited,
            url_scores,
            required_capabilities: self.required_capabilities,
            stats: self.stats,
            state: self.state,
            elapsed,
        }
    }

    fn start(&mut self) {
        let now = Instant::now();
        self.started = Some(now);
        self.deadline = Some(now + self.navigator.config.global_timeout);
        self.state = SessionState::Running;
        info!(
            session = %self.id,
            seed = %self.seed,
            keywords = ?self.keywords,
            capabilities = ?self.required_capabilities,
            page_budget = self.navigator.config.page_budget,
            max_depth = self.navigator.config.max_depth,
            "starting navigation"
        );
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.elapsed = Some(elapsed);
        info!(
            session = %self.id,
            ?state,
            visited = self.stats.urls_visited,
            admitted = self.frontier.admitted(),
            errors = self.stats.errors,
            bytes = self.stats.bytes_fetched,
            elapsed_ms = elapsed.as_millis() as u64,
            "navigation finished"
        );
    }

    #[instrument(skip_all, fields(url = %candidate.url, depth = candidate.depth))]
    async fn fetch(&self, candidate: &LinkCandidate) -> Result<FetchedPage> {
        let client = &self.navigator.client;
        let url = &candidate.url;
        let (body, content_type) = retry(
            &self.navigator.retry,
            self.deadline,
            SiteQueryError::is_transient,
            |attempt| async move {
                debug!(%url, attempt, "fetching page");
                fetch_once(client, url).await
            },
        )
        .await?;

        let score = if candidate.score.is_finite() {
            candidate.score
        } else {
            0.0
        };
        Ok(FetchedPage {
            url: url.clone(),
            byte_length: body.len(),
            content_hash: compute_hash(&body),
            content: body,
            content_type,
            depth: candidate.depth,
            score,
            fetched_at: Utc::now(),
        })
    }

    /// Score the page's links and admit them as one batch.
    fn admit_links(&mut self, page: &FetchedPage) {
        let is_html = page
            .content_type
            .as_deref()
            .is_none_or(|ct| ct.to_ascii_lowercase().contains("html"));
        if !is_html {
            return;
        }

        let depth = page.depth + 1;
        let links = self.extract_links(page);
        if links.is_empty() {
            return;
        }

        let scores = {
            let texts: Vec<LinkText<'_>> = links
                .iter()
                .map(|link| LinkText {
                    text: &link.text,
                    title: &link.title,
                    url: &link.url,
                    depth,
                })
                .collect();
            self.navigator.scorer.score_links(&texts, &self.keywords)
        };

        let mut batch = Vec::new();
        let mut near_duplicates = 0;
        for (link, score) in links.into_iter().zip(scores) {
            let fingerprint = simhash(&format!("{} {}", link.text, link.title));
            if self
                .fingerprints
                .iter()
                .any(|seen| is_near_duplicate(fingerprint, *seen, NEAR_DUPLICATE_BITS))
            {
                near_duplicates += 1;
                continue;
            }
            self.fingerprints.push(fingerprint);
            batch.push(LinkCandidate {
                url: link.url,
                anchor_text: link.text,
                title: link.title,
                score,
                depth,
                parent_url: Some(page.url.clone()),
            });
        }

        let offered_count = batch.len();
        let offered: Vec<(String, f64)> = batch
            .iter()
            .map(|c| (c.url.to_string(), c.score))
            .collect();
        let admitted = self.frontier.admit_batch(batch);
        for (url, score) in offered {
            if self.frontier.contains(&url) {
                self.observed_scores.entry(url).or_insert(score);
            }
        }

        self.stats.urls_queued = self.frontier.len();
        self.stats.avg_score = self.frontier.average_score();
        debug!(
            url = %page.url,
            offered = offered_count,
            admitted,
            near_duplicates,
            queued = self.frontier.len(),
            "admitted links"
        );
    }

    /// In-scope links not yet queued or visited, first occurrence only.
    fn extract_links(&self, page: &FetchedPage) -> Vec<DiscoveredLink> {
        let doc = Html::parse_document(&page.content);
        let user_agent = &self.navigator.config.user_agent;
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for a in doc.select(&LINK_SEL) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            let Some(url) = normalize_link(href, &page.url) else {
                continue;
            };
            if !self.scope.allows(&url)
                || self.frontier.contains(url.as_str())
                || !seen.insert(url.to_string())
            {
                continue;
            }
            if self.navigator.config.respect_robots
                && !self.robots.cached(user_agent, &url).unwrap_or(true)
            {
                continue;
            }

            let title = a.value().attr("title").unwrap_or("").trim().to_string();
            let text = link_text(a, &title, &url);
            links.push(DiscoveredLink { url, text, title });
        }
        links
    }
}

struct DiscoveredLink {
    url: Url,
    text: String,
    title: String,
}

/// Anchor text, else the title attribute, else the parent's text, else the
/// words in the URL.
fn link_text(a: ElementRef<'_>, title: &str, url: &Url) -> String {
    let text = collapse(a.text());
    if !text.is_empty() {
        return text;
    }
    if !title.is_empty() {
        return title.to_string();
    }
    if let Some(parent) = a.parent().and_then(ElementRef::wrap) {
        let context = collapse(parent.text());
        if !context.is_empty() {
            return context.chars().take(MAX_CONTEXT_CHARS).collect();
        }
    }
    url_keywords(url).join(" ")
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

async fn fetch_once(client: &Client, url: &Url) -> Result<(String, Option<String>)> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| transport_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SiteQueryError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(url, e))?;
    Ok((body, content_type))
}

fn transport_error(url: &Url, e: reqwest::Error) -> SiteQueryError {
    if e.is_timeout() {
        SiteQueryError::Timeout(format!("{url}: {e}"))
    } else {
        SiteQueryError::Network(format!("{url}: {e}"))
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
