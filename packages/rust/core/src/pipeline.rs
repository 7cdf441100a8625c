//! End-to-end `answer` pipeline: question → plan → navigate → extract →
//! assemble → synthesize.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use sitequery_crawler::{AdapterRegistry, Document, Navigator, RetryPolicy, SessionState};
use sitequery_relevance::LinkScorer;
use sitequery_shared::{
    AppConfig, Capability, Citation, ContentBlock, CrawlConfig, CrawlSection, Result,
    SiteQueryError,
};

use crate::assembler::Assembler;
use crate::planner;
use crate::synthesis::{AnswerSynthesizer, ExcerptSynthesizer};

/// Deadline of a request built with [`AnswerRequest::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A question about a web resource, with the limits for answering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Seed URL.
    pub url: Url,
    pub question: String,
    pub max_depth: u32,
    pub page_budget: usize,
    /// Maximum characters of assembled content.
    pub char_budget: usize,
    /// Whole-request deadline.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl AnswerRequest {
    /// A request with the standard limits (depth 1, 8 pages, 10,000 chars, 60s).
    pub fn new(url: Url, question: impl Into<String>) -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            ..Self::from_config(url, question, &CrawlSection::default())
        }
    }

    /// A request using the limits from a `[crawl]` config section.
    pub fn from_config(url: Url, question: impl Into<String>, crawl: &CrawlSection) -> Self {
        Self {
            url,
            question: question.into(),
            max_depth: crawl.max_depth,
            page_budget: crawl.page_budget,
            char_budget: crawl.char_budget,
            timeout: Duration::from_secs(crawl.global_timeout_secs),
        }
    }

    /// Session limits: the request's values on top of the configured crawl.
    fn crawl_config(&self, config: &AppConfig) -> CrawlConfig {
        CrawlConfig {
            max_depth: self.max_depth,
            page_budget: self.page_budget,
            char_budget: self.char_budget,
            global_timeout: self.timeout,
            ..CrawlConfig::from(&config.crawl)
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Performance and coverage figures for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub pages_visited: usize,
    pub blocks_extracted: usize,
    pub blocks_used: usize,
    pub bytes_fetched: u64,
    pub latency_ms: u64,
    /// Which limits were reached: `page_budget`, `char_budget`, `timeout`.
    pub capped: BTreeMap<String, bool>,
    /// Adapter that produced content for the most pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_used: Option<String>,
    pub capabilities_met: Vec<Capability>,
}

/// The answer with its sources and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub diagnostics: Diagnostics,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnswerResponse {
    fn failed(error: &SiteQueryError, latency: Duration) -> Self {
        Self {
            answer: String::new(),
            citations: Vec::new(),
            diagnostics: Diagnostics {
                latency_ms: latency.as_millis() as u64,
                ..Diagnostics::default()
            },
            success: false,
            error_message: Some(error.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each page is fetched.
    fn page_fetched(&self, url: &str, current: usize, budget: usize);
    /// Called when the pipeline completes, successfully or not.
    fn done(&self, response: &AnswerResponse);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_fetched(&self, _url: &str, _current: usize, _budget: usize) {}
    fn done(&self, _response: &AnswerResponse) {}
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Answers questions with a fixed configuration, adapter set and synthesizer.
pub struct AnswerEngine {
    config: AppConfig,
    registry: AdapterRegistry,
    synthesizer: Box<dyn AnswerSynthesizer>,
    allow_private_hosts: bool,
    retry_policy: Option<RetryPolicy>,
}

impl AnswerEngine {
    pub fn new(config: AppConfig) -> Self {
        let registry = AdapterRegistry::with_builtin(&config.extraction);
        Self {
            config,
            registry,
            synthesizer: Box::new(ExcerptSynthesizer::default()),
            allow_private_hosts: false,
            retry_policy: None,
        }
    }

    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Box<dyn AnswerSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Permit loopback and private-network seeds and links.
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Run the full pipeline.
    ///
    /// Never returns an error: failures are reported through
    /// [`AnswerResponse::success`] and [`AnswerResponse::error_message`].
    #[instrument(skip_all, fields(url = %request.url))]
    pub async fn answer(
        &self,
        request: &AnswerRequest,
        progress: &dyn ProgressReporter,
    ) -> AnswerResponse {
        let start = Instant::now();
        info!(question = %request.question, "starting answer pipeline");

        let response = match self.run(request, progress, start).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "answer pipeline failed");
                AnswerResponse::failed(&e, start.elapsed())
            }
        };

        progress.done(&response);
        info!(
            success = response.success,
            pages = response.diagnostics.pages_visited,
            blocks = response.diagnostics.blocks_used,
            latency_ms = response.diagnostics.latency_ms,
            "answer pipeline complete"
        );
        response
    }

    async fn run(
        &self,
        request: &AnswerRequest,
        progress: &dyn ProgressReporter,
        start: Instant,
    ) -> Result<AnswerResponse> {
        if request.question.trim().is_empty() {
            return Err(SiteQueryError::validation("question must not be empty"));
        }

        // --- Phase 1: Plan ---
        progress.phase("Planning");
        let plan = planner::plan(&request.question);

        // --- Phase 2: Navigate + extract ---
        let crawl = request.crawl_config(&self.config);
        let mut navigator = Navigator::new(crawl)?
            .allow_private_hosts(self.allow_private_hosts)
            .with_link_scorer(LinkScorer::from_config(&self.config.ranking));
        if let Some(policy) = &self.retry_policy {
            navigator = navigator.with_retry_policy(policy.clone());
        }

        progress.phase("Crawling");
        let mut session =
            navigator.navigate(&request.url, &plan.keywords, &plan.required_capabilities)?;

        let wanted = extraction_capabilities(&plan.required_capabilities);
        let mut blocks: Vec<ContentBlock> = Vec::new();
        let mut adapter_pages: Vec<(&'static str, usize)> = Vec::new();
        let mut fetched = 0;
        while let Some(page) = session.next_page().await {
            fetched += 1;
            progress.page_fetched(page.url.as_str(), fetched, request.page_budget);

            let doc = Document {
                url: &page.url,
                content_type: page.content_type.as_deref(),
                body: &page.content,
            };
            let extraction = self.registry.extract(&doc, &wanted, request.max_depth);
            if let Some(name) = extraction.adapter {
                if !extraction.blocks.is_empty() {
                    match adapter_pages.iter_mut().find(|(n, _)| *n == name) {
                        Some((_, count)) => *count += 1,
                        None => adapter_pages.push((name, 1)),
                    }
                }
            }
            blocks.extend(extraction.blocks);
        }
        let navigation = session.into_result();

        if navigation.stats.urls_visited == 0 {
            return Err(SiteQueryError::Extraction(format!(
                "no pages could be fetched from {}",
                request.url
            )));
        }

        // --- Phase 3: Assemble ---
        progress.phase("Assembling");
        let blocks_extracted = blocks.len();
        let extracted_chars: usize = blocks.iter().map(ContentBlock::char_count).sum();
        let assembly =
            Assembler::new(self.config.assembly.clone(), request.char_budget).assemble(blocks, &plan);

        // --- Phase 4: Synthesize ---
        progress.phase("Synthesizing");
        let answer = self
            .synthesizer
            .synthesize(&request.question, &assembly)
            .await?;

        let mut capped = BTreeMap::new();
        capped.insert(
            "page_budget".to_string(),
            navigation.state == SessionState::BudgetExhausted,
        );
        capped.insert(
            "char_budget".to_string(),
            assembly.stats.truncated || extracted_chars > request.char_budget,
        );
        capped.insert("timeout".to_string(), navigation.state == SessionState::TimedOut);

        // Most pages wins; ties go to the adapter seen first.
        let adapter_used = adapter_pages
            .iter()
            .fold(None::<(&str, usize)>, |best, &(name, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((name, count)),
            })
            .map(|(name, _)| name.to_string());

        let diagnostics = Diagnostics {
            pages_visited: navigation.stats.urls_visited,
            blocks_extracted,
            blocks_used: assembly.selected_blocks.len(),
            bytes_fetched: navigation.stats.bytes_fetched,
            latency_ms: start.elapsed().as_millis() as u64,
            capped,
            adapter_used,
            capabilities_met: assembly.covered(),
        };

        Ok(AnswerResponse {
            answer,
            success: assembly.error.is_none(),
            error_message: assembly.error.clone(),
            citations: assembly.citations,
            diagnostics,
        })
    }
}

/// Capabilities asked of the adapters: the plan's, plus plain sections so
/// every page yields its prose.
fn extraction_capabilities(required: &[Capability]) -> Vec<Capability> {
    let mut wanted = required.to_vec();
    if !wanted.contains(&Capability::Section) {
        wanted.push(Capability::Section);
    }
    wanted
}

/// Answer `request` with `config`, the built-in adapters and the excerpt
/// synthesizer.
pub async fn answer(
    request: &AnswerRequest,
    config: &AppConfig,
    progress: &dyn ProgressReporter,
) -> AnswerResponse {
    AnswerEngine::new(config.clone())
        .answer(request, progress)
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><body>{body}</body></html>"),
            "text/html; charset=utf-8",
        )
    }

    async fn mount(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(html(body))
            .mount(server)
            .await;
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    fn engine() -> AnswerEngine {
        let mut config = AppConfig::default();
        config.crawl.respect_robots = false;
        AnswerEngine::new(config)
            .allow_private_hosts(true)
            .with_retry_policy(fast_retry())
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recorder {
        fn phase(&self, name: &str) {
            self.events.lock().unwrap().push(format!("phase:{name}"));
        }
        fn page_fetched(&self, _url: &str, current: usize, _budget: usize) {
            self.events.lock().unwrap().push(format!("page:{current}"));
        }
        fn done(&self, response: &AnswerResponse) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done:{}", response.success));
        }
    }

    const INSTALL_TEXT: &str = "Download the widget installer for your platform and run it. \
        The installer places the widget binary on your path and creates a default configuration \
        file in your home directory. Run the install command again at any time to upgrade the widget \
        in place without losing your settings.";

    #[tokio::test]
    async fn answers_from_the_most_relevant_pages() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/",
            r#"<main>
                <h1>Widget documentation</h1>
                <p>Widgets are small services that report their health to a central dashboard over a simple protocol.</p>
                <a href="/docs/install">Install the widget</a>
                <a href="/blog/news">Company news</a>
            </main>"#,
        )
        .await;
        mount(
            &server,
            "/docs/install",
            &format!("<main><h2>Installing the widget</h2><p>{INSTALL_TEXT}</p></main>"),
        )
        .await;
        mount(
            &server,
            "/blog/news",
            "<main><h2>News</h2><p>We moved offices this spring and hired a new team of designers to help with the website.</p></main>",
        )
        .await;

        let url = Url::parse(&format!("{}/", server.uri())).unwrap();
        let request = AnswerRequest::new(url, "How do I install the widget?");
        let recorder = Recorder::default();
        let response = engine().answer(&request, &recorder).await;

        assert!(response.success, "{:?}", response.error_message);
        assert_eq!(response.diagnostics.pages_visited, 3);
        assert!(response.diagnostics.blocks_extracted >= 2);
        assert_eq!(response.diagnostics.adapter_used.as_deref(), Some("html"));
        assert_eq!(response.diagnostics.capped["page_budget"], false);
        assert_eq!(response.diagnostics.capped["timeout"], false);

        let install = format!("{}/docs/install", server.uri());
        assert_eq!(response.citations[0].url, install);
        assert!(response.answer.contains("[1]"));
        assert!(response.answer.contains("widget installer"));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("phase:Planning"));
        assert!(events.contains(&"page:3".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("done:true"));
    }

    #[tokio::test]
    async fn invalid_limits_fail_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("<p>never fetched</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/", server.uri())).unwrap();
        let mut request = AnswerRequest::new(url, "What is a widget?");
        request.page_budget = 0;
        let response = engine().answer(&request, &SilentProgress).await;

        assert!(!response.success);
        assert!(response.error_message.unwrap().contains("page_budget"));
        assert!(response.citations.is_empty());
    }

    #[tokio::test]
    async fn unreachable_seed_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let request = AnswerRequest::new(url, "What is a widget?");
        let response = engine().answer(&request, &SilentProgress).await;

        assert!(!response.success);
        assert!(response.error_message.unwrap().contains("no pages"));
    }

    #[tokio::test]
    async fn private_seeds_are_refused_by_default() {
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let request = AnswerRequest::new(url, "What is a widget?");
        let response = answer(&request, &AppConfig::default(), &SilentProgress).await;

        assert!(!response.success);
        assert!(response.error_message.unwrap().contains("private"));
    }

    #[test]
    fn request_defaults() {
        let request = AnswerRequest::new(Url::parse("https://a.test/").unwrap(), "q");
        assert_eq!(request.max_depth, 1);
        assert_eq!(request.page_budget, 8);
        assert_eq!(request.char_budget, 10_000);
        assert_eq!(request.timeout, DEFAULT_TIMEOUT);
    }
}
