//! Content assembler.
//!
//! Turns the raw blocks extracted during a crawl into the final selection:
//! deduplicated, ranked against the question, repaired so that every required
//! capability is represented, cut to the character budget, and cited.
//!
//! Assembly never fails outward. Internal errors produce an empty,
//! zero-coverage [`AssemblyResult`] that carries the error message.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use sitequery_relevance::{jaccard, simhash, token_set};
use sitequery_shared::{
    AssemblyConfig, AssemblyResult, AssemblyStats, Capability, Citation, ContentBlock, ELLIPSIS,
    PlanningResult, Result, SiteQueryError,
};

/// Smallest remaining budget worth filling with a truncated block.
pub const MIN_TRUNCATION_CHARS: usize = 200;

/// Characters of block content quoted in a citation.
pub const SNIPPET_CHARS: usize = 200;

/// Heuristic match required before a block is forced in for coverage.
const COVERAGE_THRESHOLD: f64 = 0.3;

/// Metadata key listing the capabilities a block was forced in for.
pub const COVERS_CAPABILITY: &str = "covers_capability";

/// Words that suggest a block can stand in for a capability.
fn coverage_keywords(capability: Capability) -> &'static [&'static str] {
    match capability {
        Capability::Section => &["section", "content", "documentation"],
        Capability::NavGraph => &["navigation", "menu", "link"],
        Capability::CodeMap => &["code", "function", "class", "method"],
        Capability::ApiSpec => &["api", "endpoint", "request", "response"],
        Capability::Transcript => &["transcript", "video", "audio"],
        Capability::Routes => &["route", "path", "url"],
        Capability::Manifest => &["manifest", "package", "dependency"],
        Capability::Readme => &["readme", "guide", "instructions"],
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Selects and budgets content blocks for one question.
#[derive(Debug, Clone)]
pub struct Assembler {
    config: AssemblyConfig,
    char_budget: usize,
}

impl Assembler {
    pub fn new(config: AssemblyConfig, char_budget: usize) -> Self {
        Self {
            config,
            char_budget,
        }
    }

    /// Override the configured top-N cut on the relevance ranking.
    pub fn with_max_blocks(mut self, max_blocks: Option<usize>) -> Self {
        self.config.max_blocks = max_blocks;
        self
    }

    pub fn char_budget(&self) -> usize {
        self.char_budget
    }

    /// Assemble `blocks` for the planned question.
    ///
    /// Deterministic for identical inputs. On an internal error the result is
    /// empty, reports every required capability as uncovered, and has
    /// [`AssemblyResult::error`] set.
    #[instrument(skip_all, fields(blocks = blocks.len(), budget = self.char_budget))]
    pub fn assemble(&self, blocks: Vec<ContentBlock>, plan: &PlanningResult) -> AssemblyResult {
        info!(blocks = blocks.len(), "starting assembly");
        match self.try_assemble(blocks, plan) {
            Ok(result) => {
                info!(
                    blocks = result.selected_blocks.len(),
                    chars = result.char_count,
                    citations = result.citations.len(),
                    duplicates = result.duplicates_removed,
                    "assembly complete"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "assembly failed, returning empty selection");
                AssemblyResult::failed(&plan.required_capabilities, e.to_string())
            }
        }
    }

    fn try_assemble(
        &self,
        blocks: Vec<ContentBlock>,
        plan: &PlanningResult,
    ) -> Result<AssemblyResult> {
        self.validate()?;

        let blocks_original = blocks.len();
        let deduplicated = self.deduplicate(blocks);
        let blocks_after_dedup = deduplicated.len();
        info!(blocks = blocks_after_dedup, "after deduplication");

        let mut ranked = rank(deduplicated, plan)?;
        let mut rest = match self.config.max_blocks {
            Some(max) if max < ranked.len() => ranked.split_off(max),
            _ => Vec::new(),
        };

        let forced = repair_coverage(&mut ranked, &mut rest, &plan.required_capabilities);
        let (selected, truncated) =
            self.apply_budget(forced, ranked, &plan.required_capabilities);

        let capability_coverage = coverage(&selected, &plan.required_capabilities);
        let citations = citations(&selected);
        let char_count: usize = selected.iter().map(ContentBlock::char_count).sum();

        let stats = AssemblyStats {
            blocks_original,
            blocks_after_dedup,
            blocks_final: selected.len(),
            blocks_filtered: blocks_original.saturating_sub(selected.len()),
            total_chars: char_count,
            avg_block_chars: char_count as f64 / selected.len().max(1) as f64,
            capabilities_requested: plan.required_capabilities.len(),
            capabilities_covered: capability_coverage.values().filter(|c| **c).count(),
            keywords_used: plan.keywords.len(),
            truncated,
        };

        Ok(AssemblyResult {
            selected_blocks: selected,
            capability_coverage,
            char_count,
            duplicates_removed: blocks_original - blocks_after_dedup,
            citations,
            stats,
            error: None,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.char_budget == 0 {
            return Err(SiteQueryError::validation("character budget must be positive"));
        }
        let threshold = self.config.dedup_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(SiteQueryError::validation(format!(
                "dedup threshold {threshold} outside (0, 1]"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deduplication
    // -----------------------------------------------------------------------

    /// Keep the first of every group of duplicate blocks.
    ///
    /// A block is a duplicate when its simhash equals a kept block's, or when
    /// its token Jaccard with any kept block exceeds the dedup threshold.
    fn deduplicate(&self, blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
        if blocks.len() <= 1 {
            return blocks;
        }

        let mut kept = Vec::with_capacity(blocks.len());
        let mut fingerprints = HashSet::new();
        let mut token_sets = Vec::new();

        for block in blocks {
            let fingerprint = simhash(block.content());
            if fingerprint != 0 && fingerprints.contains(&fingerprint) {
                debug!(url = %block.source_url, "dropping exact duplicate block");
                continue;
            }
            let tokens = token_set(block.content());
            if token_sets
                .iter()
                .any(|kept_tokens| jaccard(&tokens, kept_tokens) > self.config.dedup_threshold)
            {
                debug!(url = %block.source_url, "dropping similar block");
                continue;
            }
            if fingerprint != 0 {
                fingerprints.insert(fingerprint);
            }
            token_sets.push(tokens);
            kept.push(block);
        }
        kept
    }

    // -----------------------------------------------------------------------
    // Budget
    // -----------------------------------------------------------------------

    /// Spend the budget on one covering block per required capability, then
    /// on the rest in ranking order.
    ///
    /// Covering blocks are walked smallest first. Returns the selection in
    /// ranking order with forced blocks appended, and whether a block was
    /// truncated.
    fn apply_budget(
        &self,
        forced: Vec<ContentBlock>,
        ranked: Vec<ContentBlock>,
        required: &[Capability],
    ) -> (Vec<ContentBlock>, bool) {
        let ordered: Vec<ContentBlock> = ranked.into_iter().chain(forced).collect();
        let picks = coverage_picks(&ordered, required);

        let mut walk = picks.clone();
        walk.sort_by_key(|&i| (ordered[i].char_count(), i));
        walk.extend((0..ordered.len()).filter(|i| !picks.contains(i)));

        let mut pending: Vec<Option<ContentBlock>> = ordered.into_iter().map(Some).collect();
        let mut picked: Vec<Option<ContentBlock>> = pending.iter().map(|_| None).collect();
        let mut used = 0;
        let mut truncated = false;

        for i in walk {
            let Some(block) = pending[i].take() else {
                continue;
            };
            let remaining = self.char_budget - used;
            let block = if block.char_count() <= remaining {
                block
            } else if remaining >= MIN_TRUNCATION_CHARS {
                match block.truncated(remaining) {
                    Some(cut) => {
                        truncated = true;
                        cut
                    }
                    None => break,
                }
            } else {
                break;
            };

            used += block.char_count();
            picked[i] = Some(block);
            if truncated {
                break;
            }
        }

        info!(used, budget = self.char_budget, "applied character budget");
        (picked.into_iter().flatten().collect(), truncated)
    }
}

/// Assemble with the default assembly settings.
pub fn assemble(
    blocks: Vec<ContentBlock>,
    plan: &PlanningResult,
    char_budget: usize,
    max_blocks: Option<usize>,
) -> AssemblyResult {
    Assembler::new(AssemblyConfig::default(), char_budget)
        .with_max_blocks(max_blocks)
        .assemble(blocks, plan)
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

/// Score every block against the plan and sort best first.
///
/// Equal scores keep their extraction order.
fn rank(mut blocks: Vec<ContentBlock>, plan: &PlanningResult) -> Result<Vec<ContentBlock>> {
    for block in &mut blocks {
        let keyword = keyword_score(block.content(), &plan.keywords);
        let capability = plan.weight_of(block.content_type.capability());
        let url = url_score(&block.source_url, &plan.keywords);
        let base = block.quality_score;

        let total = base * 0.3 + keyword * 0.4 + capability * 0.2 + url * 0.1;
        if !total.is_finite() {
            return Err(SiteQueryError::validation(format!(
                "non-finite relevance score for block from {}",
                block.source_url
            )));
        }

        block.relevance_score = total;
        block.metadata.insert("question_relevance_score".into(), Value::from(total));
        block.metadata.insert("keyword_score".into(), Value::from(keyword));
        block.metadata.insert("capability_score".into(), Value::from(capability));
        block.metadata.insert("url_score".into(), Value::from(url));
        block.metadata.insert("base_quality_score".into(), Value::from(base));
    }

    blocks.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    Ok(blocks)
}

/// Fraction of keywords present plus up to 0.2 for repeated occurrences.
fn keyword_score(content: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() || content.is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();
    let mut present = 0usize;
    let mut occurrences = 0usize;
    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        let count = lower.matches(keyword.as_str()).count();
        if count > 0 {
            present += 1;
        }
        occurrences += count;
    }
    let bonus = (occurrences as f64 * 0.05).min(0.2);
    (present as f64 / keywords.len() as f64 + bonus).min(1.0)
}

/// Fraction of keywords appearing in the source URL.
fn url_score(url: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() || url.is_empty() {
        return 0.0;
    }
    let lower = url.to_lowercase();
    let present = keywords
        .iter()
        .filter(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
        .count();
    (present as f64 / keywords.len() as f64).min(1.0)
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

/// Fraction of a capability's coverage keywords found in the block.
fn coverage_estimate(block: &ContentBlock, capability: Capability) -> f64 {
    let keywords = coverage_keywords(capability);
    let lower = block.content().to_lowercase();
    let matches = keywords.iter().filter(|k| lower.contains(*k)).count();
    matches as f64 / keywords.len() as f64
}

fn covers(block: &ContentBlock, capability: Capability) -> bool {
    if block.content_type.capability() == capability {
        return true;
    }
    block
        .metadata
        .get(COVERS_CAPABILITY)
        .and_then(Value::as_array)
        .is_some_and(|caps| caps.iter().any(|c| c.as_str() == Some(capability.as_str())))
}

fn tag(block: &mut ContentBlock, capability: Capability) {
    let entry = block
        .metadata
        .entry(COVERS_CAPABILITY)
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(caps) = entry {
        caps.push(Value::from(capability.as_str()));
    }
}

/// Find a block for every required capability the ranking misses.
///
/// An unselected block of the capability's own content type wins first.
/// Otherwise the best keyword-heuristic match above the threshold is used,
/// whether or not it was already selected. Blocks pulled in from outside the
/// ranking are returned; blocks tagged in place stay where they are.
fn repair_coverage(
    ranked: &mut [ContentBlock],
    rest: &mut Vec<ContentBlock>,
    required: &[Capability],
) -> Vec<ContentBlock> {
    let mut forced: Vec<ContentBlock> = Vec::new();

    for &capability in required {
        let represented = ranked
            .iter()
            .chain(forced.iter())
            .any(|b| covers(b, capability));
        if represented {
            continue;
        }

        if let Some(pos) = rest
            .iter()
            .position(|b| b.content_type.capability() == capability)
        {
            let mut block = rest.remove(pos);
            tag(&mut block, capability);
            info!(capability = %capability, url = %block.source_url, "added block for capability");
            forced.push(block);
            continue;
        }

        let mut best: Option<(Slot, f64)> = None;
        let slots = ranked
            .iter()
            .enumerate()
            .map(|(i, b)| (Slot::Ranked(i), b))
            .chain(forced.iter().enumerate().map(|(i, b)| (Slot::Forced(i), b)))
            .chain(rest.iter().enumerate().map(|(i, b)| (Slot::Rest(i), b)));
        for (slot, block) in slots {
            let score = coverage_estimate(block, capability);
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((slot, score));
            }
        }

        match best {
            Some((slot, score)) if score > COVERAGE_THRESHOLD => {
                let block = match slot {
                    Slot::Ranked(i) => &mut ranked[i],
                    Slot::Forced(i) => &mut forced[i],
                    Slot::Rest(i) => {
                        let block = rest.remove(i);
                        forced.push(block);
                        let last = forced.len() - 1;
                        &mut forced[last]
                    }
                };
                tag(block, capability);
                info!(
                    capability = %capability,
                    url = %block.source_url,
                    score,
                    "added block for capability"
                );
            }
            _ => debug!(capability = %capability, "no block can cover capability"),
        }
    }

    forced
}

/// Index of the first block covering each required capability. A block
/// already picked for one capability also serves any other it covers.
fn coverage_picks(blocks: &[ContentBlock], required: &[Capability]) -> Vec<usize> {
    let mut picks: Vec<usize> = Vec::new();
    for &capability in required {
        if picks.iter().any(|&i| covers(&blocks[i], capability)) {
            continue;
        }
        if let Some(i) = blocks.iter().position(|b| covers(b, capability)) {
            picks.push(i);
        }
    }
    picks
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Ranked(usize),
    Forced(usize),
    Rest(usize),
}

fn coverage(blocks: &[ContentBlock], required: &[Capability]) -> BTreeMap<Capability, bool> {
    required
        .iter()
        .map(|&cap| (cap, blocks.iter().any(|b| covers(b, cap))))
        .collect()
}

// ---------------------------------------------------------------------------
// Citations
// ---------------------------------------------------------------------------

/// One citation per distinct source URL, in selection order.
fn citations(blocks: &[ContentBlock]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for block in blocks {
        if !seen.insert(block.source_url.as_str()) {
            continue;
        }
        let mut snippet: String = block.content().chars().take(SNIPPET_CHARS).collect();
        snippet = snippet.trim().to_string();
        if block.char_count() > SNIPPET_CHARS {
            snippet.push_str(ELLIPSIS);
        }
        out.push(Citation {
            url: block.source_url.clone(),
            title: block
                .title
                .clone()
                .unwrap_or_else(|| format!("Content from {}", block.source_url)),
            snippet,
            content_type: block.content_type,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use sitequery_shared::{BlockPolicy, ContentType, QuestionType};

    use super::*;

    fn policy() -> BlockPolicy {
        BlockPolicy {
            min_content_length: 10,
            quality_threshold: 0.0,
        }
    }

    fn block(content_type: ContentType, content: &str, url: &str) -> ContentBlock {
        policy()
            .build(content_type, content, url, Some(format!("{url} block")), Map::new())
            .unwrap()
    }

    /// `words` repeated and cut to exactly `len` characters.
    fn filler(words: &[&str], len: usize) -> String {
        let mut text = String::new();
        while text.len() < len {
            for w in words {
                text.push_str(w);
                text.push(' ');
            }
        }
        text.truncate(len - 1);
        text.push('x');
        text
    }

    fn plan(keywords: &[&str], required: &[(Capability, f64)]) -> PlanningResult {
        PlanningResult {
            question: keywords.join(" "),
            normalized_question: keywords.join(" "),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            required_capabilities: required.iter().map(|(c, _)| *c).collect(),
            capability_scores: required.iter().copied().collect(),
            question_type: QuestionType::HowTo,
            confidence: 0.8,
        }
    }

    #[test]
    fn budget_truncates_the_overflowing_block() {
        let first = block(
            ContentType::Section,
            &filler(&["install", "package", "manager", "version"], 700),
            "https://a.test/install",
        );
        let second = block(
            ContentType::Section,
            &filler(&["deploy", "cluster", "region", "replica"], 700),
            "https://a.test/deploy",
        );
        let result = assemble(vec![first, second], &plan(&["install"], &[]), 1000, None);

        assert!(result.error.is_none());
        assert_eq!(result.selected_blocks.len(), 2);
        assert_eq!(result.char_count, 1000);
        assert!(result.stats.truncated);

        let cut = &result.selected_blocks[1];
        assert!(cut.is_truncated());
        assert_eq!(cut.char_count(), 300);
        assert!(cut.content().ends_with(ELLIPSIS));
        assert_eq!(cut.metadata["original_length"], Value::from(700));
    }

    #[test]
    fn budget_stops_without_truncating_small_remainders() {
        let first = block(
            ContentType::Section,
            &filler(&["install", "package", "manager", "version"], 850),
            "https://a.test/install",
        );
        let second = block(
            ContentType::Section,
            &filler(&["deploy", "cluster", "region", "replica"], 700),
            "https://a.test/deploy",
        );
        let result = assemble(vec![first, second], &plan(&["install"], &[]), 1000, None);

        assert_eq!(result.selected_blocks.len(), 1);
        assert_eq!(result.char_count, 850);
        assert!(!result.stats.truncated);
    }

    #[test]
    fn duplicates_and_reorderings_are_removed() {
        let text = "Authenticate every request with a bearer token passed in the authorization header.";
        let reordered = "Passed in the authorization header, a bearer token must authenticate every request.";
        let other = "Rate limits reset every minute and apply separately to each registered application.";
        let blocks = vec![
            block(ContentType::Section, text, "https://a.test/auth"),
            block(ContentType::Section, text, "https://a.test/auth-copy"),
            block(ContentType::Section, reordered, "https://a.test/auth-again"),
            block(ContentType::Section, other, "https://a.test/limits"),
        ];
        let result = assemble(blocks, &plan(&["token"], &[]), 10_000, None);

        assert_eq!(result.duplicates_removed, 2);
        assert_eq!(result.stats.blocks_after_dedup, 2);
        let urls: Vec<&str> = result
            .selected_blocks
            .iter()
            .map(|b| b.source_url.as_str())
            .collect();
        assert!(urls.contains(&"https://a.test/auth"));
        assert!(urls.contains(&"https://a.test/limits"));
    }

    #[test]
    fn keyword_rich_blocks_rank_first() {
        let blocks = vec![
            block(
                ContentType::Section,
                "The changelog lists every release with its date and a short summary of changes.",
                "https://a.test/changelog",
            ),
            block(
                ContentType::Section,
                "Install the client, then configure the install directory before running install again.",
                "https://a.test/install",
            ),
        ];
        let result = assemble(blocks, &plan(&["install", "configure"], &[]), 10_000, None);

        assert_eq!(result.selected_blocks[0].source_url, "https://a.test/install");
        assert!(result.selected_blocks[0].relevance_score > result.selected_blocks[1].relevance_score);
        assert!(result.selected_blocks[0].metadata.contains_key("keyword_score"));
    }

    #[test]
    fn missing_capability_is_forced_in_past_the_block_limit() {
        let blocks = vec![
            block(
                ContentType::Section,
                "Install the widget client with the package manager and configure the widget token.",
                "https://a.test/guide",
            ),
            block(
                ContentType::ApiSpec,
                "POST /v1/things creates a thing and returns its identifier in the body.",
                "https://a.test/reference",
            ),
        ];
        let plan = plan(
            &["widget", "install"],
            &[(Capability::Section, 0.5), (Capability::ApiSpec, 0.4)],
        );
        let result = assemble(blocks, &plan, 10_000, Some(1));

        assert_eq!(result.selected_blocks.len(), 2);
        assert_eq!(result.selected_blocks[0].source_url, "https://a.test/guide");
        let forced = &result.selected_blocks[1];
        assert_eq!(forced.content_type, ContentType::ApiSpec);
        assert_eq!(forced.metadata[COVERS_CAPABILITY], serde_json::json!(["api_spec"]));
        assert_eq!(result.capability_coverage[&Capability::ApiSpec], true);
        assert_eq!(result.capability_coverage[&Capability::Section], true);
    }

    #[test]
    fn heuristic_match_covers_a_capability_without_native_blocks() {
        let blocks = vec![block(
            ContentType::Section,
            "Each class exposes a method per function of the code generator, documented below.",
            "https://a.test/generator",
        )];
        let plan = plan(&["generator"], &[(Capability::CodeMap, 0.6)]);
        let result = assemble(blocks, &plan, 10_000, None);

        assert_eq!(result.selected_blocks.len(), 1);
        assert_eq!(result.capability_coverage[&Capability::CodeMap], true);
        assert_eq!(
            result.selected_blocks[0].metadata[COVERS_CAPABILITY],
            serde_json::json!(["code_map"])
        );
    }

    #[test]
    fn uncoverable_capability_is_reported_missing() {
        let blocks = vec![block(
            ContentType::Section,
            "Rate limits reset every minute and apply separately to each registered application.",
            "https://a.test/limits",
        )];
        let plan = plan(&["limits"], &[(Capability::Transcript, 0.5)]);
        let result = assemble(blocks, &plan, 10_000, None);

        assert_eq!(result.capability_coverage[&Capability::Transcript], false);
        assert_eq!(result.stats.capabilities_covered, 0);
    }

    #[test]
    fn forced_blocks_survive_a_tight_budget() {
        let guide = block(
            ContentType::Section,
            &filler(&["widget", "install", "configure", "client"], 900),
            "https://a.test/guide",
        );
        let api = block(
            ContentType::ApiSpec,
            &filler(&["endpoint", "returns", "identifier", "thing"], 400),
            "https://a.test/reference",
        );
        let plan = plan(
            &["widget", "install"],
            &[(Capability::Section, 0.5), (Capability::ApiSpec, 0.4)],
        );
        let result = assemble(vec![guide, api], &plan, 1000, Some(1));

        assert_eq!(result.capability_coverage[&Capability::ApiSpec], true);
        assert_eq!(result.char_count, 1000);
        // Ranking order is kept in the output: the truncated guide comes first.
        assert_eq!(result.selected_blocks[0].source_url, "https://a.test/guide");
        assert!(result.selected_blocks[0].is_truncated());
        assert_eq!(result.selected_blocks[1].char_count(), 400);
    }

    #[test]
    fn ranked_capability_blocks_are_budgeted_before_the_rest() {
        let guide = block(
            ContentType::Section,
            &filler(&["widget", "install", "configure", "client"], 1050),
            "https://a.test/guide",
        );
        let api = block(
            ContentType::ApiSpec,
            &filler(&["endpoint", "returns", "identifier", "thing"], 310),
            "https://a.test/reference",
        );
        let plan = plan(
            &["widget", "install"],
            &[(Capability::Section, 0.5), (Capability::ApiSpec, 0.4)],
        );
        let result = assemble(vec![guide, api], &plan, 1000, None);

        assert_eq!(result.capability_coverage[&Capability::Section], true);
        assert_eq!(result.capability_coverage[&Capability::ApiSpec], true);
        assert_eq!(result.char_count, 1000);
        assert!(result.stats.truncated);
        assert_eq!(result.selected_blocks.len(), 2);
        assert_eq!(result.selected_blocks[0].source_url, "https://a.test/guide");
        assert_eq!(result.selected_blocks[0].char_count(), 690);
        assert_eq!(result.selected_blocks[1].source_url, "https://a.test/reference");
        assert_eq!(result.selected_blocks[1].char_count(), 310);
        assert!(!result.selected_blocks[1].is_truncated());
    }

    #[test]
    fn one_citation_per_url_with_snippet() {
        let long = filler(&["install", "package", "manager", "version"], 450);
        let blocks = vec![
            block(ContentType::Section, &long, "https://a.test/install"),
            block(
                ContentType::CodeMap,
                "import widgets\nclient = widgets.connect(token)\nclient.setup()",
                "https://a.test/install",
            ),
            block(
                ContentType::Section,
                "Rate limits reset every minute and apply separately to each registered application.",
                "https://a.test/limits",
            ),
        ];
        let result = assemble(blocks, &plan(&["install"], &[]), 10_000, None);

        assert_eq!(result.citations.len(), 2);
        let install = result
            .citations
            .iter()
            .find(|c| c.url == "https://a.test/install")
            .unwrap();
        assert!(install.snippet.ends_with(ELLIPSIS));
        assert!(install.snippet.starts_with("install package"));
        assert!(install.snippet.chars().count() <= SNIPPET_CHARS + ELLIPSIS.len());
        let limits = result
            .citations
            .iter()
            .find(|c| c.url == "https://a.test/limits")
            .unwrap();
        assert!(!limits.snippet.ends_with(ELLIPSIS));
        assert_eq!(limits.title, "https://a.test/limits block");
    }

    #[test]
    fn internal_errors_produce_an_empty_annotated_result() {
        let blocks = vec![block(
            ContentType::Section,
            "Rate limits reset every minute and apply separately to each registered application.",
            "https://a.test/limits",
        )];
        let plan = plan(&["limits"], &[(Capability::Section, 0.5)]);
        let result = assemble(blocks, &plan, 0, None);

        assert!(result.selected_blocks.is_empty());
        assert_eq!(result.char_count, 0);
        assert_eq!(result.capability_coverage[&Capability::Section], false);
        assert!(result.error.as_deref().unwrap().contains("budget"));
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let result = assemble(Vec::new(), &plan(&["anything"], &[]), 1000, None);
        assert!(result.error.is_none());
        assert!(result.selected_blocks.is_empty());
        assert!(result.citations.is_empty());
        assert_eq!(result.stats.avg_block_chars, 0.0);
    }

    #[test]
    fn assembly_is_deterministic() {
        let make = || {
            vec![
                block(
                    ContentType::Section,
                    "Install the client, then configure the install directory before running install again.",
                    "https://a.test/install",
                ),
                block(
                    ContentType::Section,
                    "The changelog lists every release with its date and a short summary of changes.",
                    "https://a.test/changelog",
                ),
            ]
        };
        let plan = plan(&["install"], &[(Capability::Section, 0.7)]);
        let a = assemble(make(), &plan, 10_000, None);
        let b = assemble(make(), &plan, 10_000, None);
        assert_eq!(a.selected_blocks, b.selected_blocks);
        assert_eq!(a.citations, b.citations);
    }
}
