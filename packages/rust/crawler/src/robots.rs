//! robots.txt parsing and a per-session, per-origin cache.
//!
//! Rules follow the common interpretation of the robots exclusion protocol:
//! the most specific matching `User-agent` group applies, the longest matching
//! `Allow`/`Disallow` path wins, `Allow` wins ties, and `*` / `$` wildcards are
//! honoured. Anything that goes wrong while fetching robots.txt allows the
//! crawl to proceed.

use std::collections::HashMap;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

// ---------------------------------------------------------------------------
// Parsed rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    allow: bool,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed robots.txt for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
}

impl RobotsRules {
    /// Rules that allow everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse the body of a robots.txt file. Unknown directives are ignored.
    pub fn parse(body: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        let mut in_agent_block = false;

        for raw in body.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_block {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(Group::default());
                        in_agent_block = true;
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    in_agent_block = false;
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    // An empty Disallow means "allow everything" and adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    group.rules.push(Rule {
                        pattern: value.to_string(),
                        allow: key == "allow",
                    });
                }
                _ => {
                    in_agent_block = false;
                }
            }
        }
        if let Some(group) = current {
            groups.push(group);
        }

        Self { groups }
    }

    /// Whether `user_agent` may fetch `url`.
    pub fn can_fetch(&self, user_agent: &str, url: &Url) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut best: Option<(usize, bool)> = None;
        for rule in &group.rules {
            if !pattern_matches(&rule.pattern, &target) {
                continue;
            }
            let specificity = rule.pattern.len();
            best = match best {
                Some((len, allow)) if len > specificity || (len == specificity && allow) => {
                    Some((len, allow))
                }
                _ => Some((specificity, rule.allow)),
            };
        }

        best.map(|(_, allow)| allow).unwrap_or(true)
    }

    /// The group naming the longest matching product token, else the `*` group.
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let product = user_agent
            .split('/')
            .next()
            .unwrap_or(user_agent)
            .trim()
            .to_ascii_lowercase();

        let mut best: Option<(&Group, usize)> = None;
        let mut wildcard = None;
        for group in &self.groups {
            for agent in &group.agents {
                if agent == "*" {
                    wildcard.get_or_insert(group);
                } else if !agent.is_empty()
                    && product.contains(agent.as_str())
                    && best.is_none_or(|(_, len)| agent.len() > len)
                {
                    best = Some((group, agent.len()));
                }
            }
        }
        best.map(|(group, _)| group).or(wildcard)
    }
}

/// Match a robots path pattern (with `*` and trailing `$`) against a path.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let pieces: Vec<&str> = pattern.split('*').collect();
    let Some(first) = pieces.first() else {
        return true;
    };
    if !path.starts_with(first) {
        return false;
    }

    let mut pos = first.len();
    let last_index = pieces.len() - 1;
    for (i, piece) in pieces.iter().enumerate().skip(1) {
        if i == last_index && anchored {
            return path.len() >= pos + piece.len() && path.ends_with(piece);
        }
        match path[pos..].find(piece) {
            Some(offset) => pos += offset + piece.len(),
            None => return false,
        }
    }

    !anchored || pos == path.len()
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// robots.txt rules per origin, fetched at most once per session.
#[derive(Debug, Default)]
pub struct RobotsCache {
    by_origin: HashMap<String, RobotsRules>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `url` may be fetched, fetching the origin's robots.txt on first use.
    pub async fn can_fetch(&mut self, client: &Client, user_agent: &str, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        if !self.by_origin.contains_key(&origin) {
            let rules = fetch_rules(client, &origin).await;
            self.by_origin.insert(origin.clone(), rules);
        }
        self.by_origin
            .get(&origin)
            .map(|rules| rules.can_fetch(user_agent, url))
            .unwrap_or(true)
    }

    /// Cached answer for an origin already fetched; `None` if not cached yet.
    pub fn cached(&self, user_agent: &str, url: &Url) -> Option<bool> {
        let origin = url.origin().ascii_serialization();
        self.by_origin
            .get(&origin)
            .map(|rules| rules.can_fetch(user_agent, url))
    }
}

async fn fetch_rules(client: &Client, origin: &str) -> RobotsRules {
    let robots_url = format!("{origin}/robots.txt");
    debug!(url = %robots_url, "fetching robots.txt");

    let response = match client.get(&robots_url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %robots_url, error = %e, "could not fetch robots.txt, allowing all");
            return RobotsRules::allow_all();
        }
    };

    if !response.status().is_success() {
        debug!(url = %robots_url, status = response.status().as_u16(), "no robots.txt, allowing all");
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(body) => RobotsRules::parse(&body),
        Err(e) => {
            warn!(url = %robots_url, error = %e, "could not read robots.txt, allowing all");
            RobotsRules::allow_all()
        }
    }
}
