use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

use super::fetcher::{FetchedResource, Transport, ACCEPT_ROBOTS, ACCEPT_SITEMAP};

/// Conventional sitemap locations, tried against the site origin in this order.
pub const KNOWN_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap/sitemap.xml",
    "/sitemaps/sitemap.xml",
    "/wp-sitemap.xml", // WordPress core
    "/sitemap/index.xml",
    // Yoast / WooCommerce style per-type sitemaps
    "/post-sitemap.xml",
    "/page-sitemap.xml",
    "/product-sitemap.xml",
    "/category-sitemap.xml",
];

static ROBOTS_SITEMAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^Sitemap:\s*(.+)$").expect("robots sitemap regex is valid")
});

/// Progress observer: `(status text, percent 0..=100)`.
///
/// Driven by which discovery step is running. Purely advisory; discovery
/// behaves identically whether or not one is supplied.
pub type Progress<'a> = &'a (dyn Fn(&str, u8) + Send + Sync);

/// Errors that end a discovery run.
///
/// Individual candidate misses are not errors at this level; see
/// [`FetchError`](super::FetchError).
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The input could not be turned into an absolute http(s) URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Every candidate location was tried and none responded with a sitemap
    #[error("Could not find sitemap. Please check the URL and try again.")]
    Exhausted,
}

/// Normalizes raw user input into the base URL every discovery step uses.
///
/// Trims whitespace, defaults the scheme to `https://` and strips trailing
/// slashes. Returns the normalized string (used verbatim for the direct and
/// `.xml` attempts) alongside its parsed form (used for the origin).
pub fn normalize_input(raw: &str) -> Result<(String, Url), DiscoveryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DiscoveryError::InvalidUrl("empty input".to_owned()));
    }

    let lower = trimmed.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };

    let normalized = with_scheme.trim_end_matches('/').to_owned();

    let parsed =
        Url::parse(&normalized).map_err(|e| DiscoveryError::InvalidUrl(format!("{normalized}: {e}")))?;
    if parsed.host_str().is_none() {
        return Err(DiscoveryError::InvalidUrl(format!("{normalized}: missing host")));
    }

    Ok((normalized, parsed))
}

/// Extracts `Sitemap:` directives from a robots.txt body, in file order.
pub fn parse_robots_sitemaps(robots: &str) -> Vec<String> {
    ROBOTS_SITEMAP_RE
        .captures_iter(robots)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|url| !url.is_empty())
        .collect()
}

/// Locates a sitemap starting from a loosely specified URL or bare domain.
///
/// Candidates are tried one at a time, stopping at the first 2xx response:
///
/// 1. the normalized input itself
/// 2. the normalized input with `.xml` appended (unless it already ends in `.xml`)
/// 3. each of [`KNOWN_SITEMAP_PATHS`] on the input's origin
/// 4. every `Sitemap:` URL declared in `<origin>/robots.txt`
///
/// A URL already attempted earlier in the run is not requested again.
///
/// # Errors
///
/// - [`DiscoveryError::InvalidUrl`] if the input is empty or unparseable
/// - [`DiscoveryError::Exhausted`] if no candidate responded
pub async fn discover_sitemap<T: Transport + Sync>(
    transport: &T,
    raw_input: &str,
    progress: Option<Progress<'_>>,
) -> Result<FetchedResource, DiscoveryError> {
    let report = |status: &str, percent: u8| {
        if let Some(observer) = progress {
            observer(status, percent);
        }
    };

    let (normalized, parsed) = normalize_input(raw_input)?;
    tracing::debug!(input = %raw_input.trim(), normalized = %normalized, "Starting sitemap discovery");

    let mut attempts = Attempts::new(transport);

    report("Fetching sitemap...", 10);
    if let Some(found) = attempts.try_candidate(&normalized).await {
        return Ok(found);
    }

    if !normalized.to_ascii_lowercase().ends_with(".xml") {
        report("Trying .xml extension...", 20);
        if let Some(found) = attempts.try_candidate(&format!("{normalized}.xml")).await {
            return Ok(found);
        }
    }

    let origin = parsed.origin().ascii_serialization();

    report("Checking common sitemap locations...", 30);
    for path in KNOWN_SITEMAP_PATHS {
        if let Some(found) = attempts.try_candidate(&format!("{origin}{path}")).await {
            return Ok(found);
        }
    }

    report("Checking robots.txt...", 60);
    let declared = sitemaps_from_robots(transport, &origin).await;
    if !declared.is_empty() {
        report("Trying sitemaps declared in robots.txt...", 70);
    }
    for candidate in &declared {
        if let Some(found) = attempts.try_candidate(candidate).await {
            return Ok(found);
        }
    }

    tracing::info!(
        normalized = %normalized,
        attempted = attempts.tried.len(),
        "No sitemap found at any candidate location"
    );
    Err(DiscoveryError::Exhausted)
}

/// Candidate bookkeeping for one discovery run.
struct Attempts<'a, T> {
    transport: &'a T,
    tried: HashSet<String>,
}

impl<'a, T: Transport + Sync> Attempts<'a, T> {
    fn new(transport: &'a T) -> Self {
        Self {
            transport,
            tried: HashSet::new(),
        }
    }

    /// One GET per distinct URL; any failure is logged and reported as a miss.
    async fn try_candidate(&mut self, url: &str) -> Option<FetchedResource> {
        if !self.tried.insert(url.to_owned()) {
            tracing::debug!(url = %url, "Candidate already attempted, skipping");
            return None;
        }

        match self.transport.get(url, ACCEPT_SITEMAP).await {
            Ok(resource) => {
                tracing::info!(
                    url = %url,
                    content_type = %resource.content_type,
                    bytes = resource.body.len(),
                    "Found sitemap"
                );
                Some(resource)
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Sitemap candidate missed");
                None
            }
        }
    }
}

async fn sitemaps_from_robots<T: Transport + Sync>(transport: &T, origin: &str) -> Vec<String> {
    let robots_url = format!("{origin}/robots.txt");

    match transport.get(&robots_url, ACCEPT_ROBOTS).await {
        Ok(resource) => {
            let declared = parse_robots_sitemaps(&String::from_utf8_lossy(&resource.body));
            tracing::debug!(url = %robots_url, declared = declared.len(), "Read robots.txt");
            declared
        }
        Err(e) => {
            tracing::debug!(url = %robots_url, error = %e, "No robots.txt available");
            Vec::new()
        }
    }
}
