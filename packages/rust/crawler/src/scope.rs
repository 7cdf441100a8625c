//! Which URLs a navigation session may follow.
//!
//! A link is in scope when it shares the seed's scheme and host, is not a
//! binary/media/download resource, and does not target a private network
//! (unless explicitly allowed for tests).

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Query parameters that only identify campaigns or referrers.
const TRACKING_PARAMS: [&str; 11] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "source",
    "campaign",
    "affiliate",
];

/// Documents, archives, images, video, audio and asset directories.
static DENY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \.(pdf|doc|docx|xls|xlsx|ppt|pptx|zip|rar|tar|gz)$
        | \.(jpg|jpeg|png|gif|bmp|svg|webp)$
        | \.(mp4|avi|mov|wmv|flv|webm)$
        | \.(mp3|wav|ogg|aac)$
        | /(download|attachment|file|media|static|assets)/
        ",
    )
    .unwrap()
});

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Scope of one session, anchored on the seed URL.
#[derive(Debug, Clone)]
pub struct CrawlScope {
    scheme: String,
    host: String,
    port: Option<u16>,
    allow_private: bool,
}

impl CrawlScope {
    pub fn new(seed: &Url, allow_private: bool) -> Self {
        Self {
            scheme: seed.scheme().to_string(),
            host: seed.host_str().unwrap_or("").to_string(),
            port: seed.port_or_known_default(),
            allow_private,
        }
    }

    /// Same scheme and host as the seed.
    pub fn same_site(&self, url: &Url) -> bool {
        url.scheme() == self.scheme
            && url.host_str().unwrap_or("") == self.host
            && url.port_or_known_default() == self.port
    }

    /// Whether a discovered link may be followed at all.
    pub fn allows(&self, url: &Url) -> bool {
        self.same_site(url) && !is_denied(url) && (self.allow_private || !is_ssrf_target(url))
    }
}

/// Matches the fixed deny-list of non-content resources.
pub fn is_denied(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }
    DENY_RE.is_match(url.path())
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Resolve `href` against `base`, dropping fragments and tracking parameters.
///
/// Returns `None` for fragment-only links, `javascript:`/`mailto:`/`tel:`
/// links and anything that fails to parse.
pub fn normalize_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    Some(normalize_url(&resolved))
}

/// Canonical form of a URL for visit bookkeeping.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    if normalized.query().is_some() {
        let kept: Vec<(String, String)> = normalized
            .query_pairs()
            .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_ascii_lowercase().as_str()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            normalized.set_query(None);
        } else {
            normalized.query_pairs_mut().clear().extend_pairs(kept);
        }
    }
    normalized
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a loopback, private or otherwise internal host.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn normalize_strips_fragment_and_tracking() {
        let base = url("https://docs.example.com/guide/");
        let link = normalize_link("intro?utm_source=x&lang=en&fbclid=1#setup", &base).unwrap();
        assert_eq!(link.as_str(), "https://docs.example.com/guide/intro?lang=en");

        let link = normalize_link("/api?ref=home", &base).unwrap();
        assert_eq!(link.as_str(), "https://docs.example.com/api");
    }

    #[test]
    fn normalize_rejects_non_links() {
        let base = url("https://docs.example.com/");
        assert!(normalize_link("#top", &base).is_none());
        assert!(normalize_link("mailto:team@example.com", &base).is_none());
        assert!(normalize_link("JavaScript:void(0)", &base).is_none());
        assert!(normalize_link("tel:+100", &base).is_none());
        assert!(normalize_link("  ", &base).is_none());
    }

    #[test]
    fn deny_list_blocks_binaries_and_asset_paths() {
        assert!(is_denied(&url("https://a.test/files/report.PDF")));
        assert!(is_denied(&url("https://a.test/img/logo.png")));
        assert!(is_denied(&url("https://a.test/static/app.html")));
        assert!(is_denied(&url("https://a.test/download/tool")));
        assert!(is_denied(&url("ftp://a.test/readme")));
        assert!(!is_denied(&url("https://a.test/docs/files-and-folders")));
        assert!(!is_denied(&url("https://a.test/api/reference.html")));
    }

    #[test]
    fn scope_requires_same_scheme_and_host() {
        let scope = CrawlScope::new(&url("https://docs.example.com/"), false);
        assert!(scope.allows(&url("https://docs.example.com/guide")));
        assert!(!scope.allows(&url("http://docs.example.com/guide")));
        assert!(!scope.allows(&url("https://blog.example.com/guide")));
        assert!(!scope.allows(&url("https://docs.example.com/media/video")));
    }

    #[test]
    fn ssrf_guard() {
        assert!(is_ssrf_target(&url("http://127.0.0.1:8080/")));
        assert!(is_ssrf_target(&url("http://192.168.1.1/admin")));
        assert!(is_ssrf_target(&url("http://localhost:3000/")));
        assert!(is_ssrf_target(&url("http://[::1]/")));
        assert!(!is_ssrf_target(&url("https://docs.example.com/page")));

        let local = url("http://127.0.0.1:4000/");
        assert!(!CrawlScope::new(&local, false).allows(&url("http://127.0.0.1:4000/a")));
        assert!(CrawlScope::new(&local, true).allows(&url("http://127.0.0.1:4000/a")));
    }
}
