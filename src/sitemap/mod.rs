//! Sitemap discovery, retrieval and parsing.
//!
//! - **Discovery**: turn a loosely specified URL or bare domain into a fetched
//!   sitemap by walking an ordered list of candidate locations
//! - **Fetching**: the [`Transport`] seam and its `reqwest` implementation
//! - **Parsing**: gzip-aware decoding of URL-set documents into [`PageRecord`]s
//!
//! # Example
//!
//! ```ignore
//! use sitemap_scout::sitemap::{fetch_sitemap, HttpTransport};
//!
//! let transport = HttpTransport::new(HttpTransport::build_client(&config)?, &config);
//! let records = fetch_sitemap(&transport, "example.com", None).await?;
//! ```

mod discovery;
mod fetcher;
mod parser;

use thiserror::Error;

pub use discovery::{
    discover_sitemap, normalize_input, parse_robots_sitemaps, DiscoveryError, Progress,
    KNOWN_SITEMAP_PATHS,
};
pub use fetcher::{
    FetchError, FetchedResource, HttpTransport, Transport, ACCEPT_ROBOTS, ACCEPT_SITEMAP,
};
pub use parser::{parse_sitemap, PageRecord, ParseError};

/// Failure of the full discover-then-parse pipeline.
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Discovers the sitemap for `raw_input` and parses it into page records.
///
/// Progress continues past discovery through decoding and parsing, finishing
/// at 100 on success.
pub async fn fetch_sitemap<T: Transport + Sync>(
    transport: &T,
    raw_input: &str,
    progress: Option<Progress<'_>>,
) -> Result<Vec<PageRecord>, SitemapError> {
    let resource = discover_sitemap(transport, raw_input, progress).await?;

    if let Some(observer) = progress {
        if resource.content_type.to_ascii_lowercase().contains("gzip") {
            observer("Decompressing gzipped content...", 80);
        }
        observer("Parsing XML content...", 85);
    }

    let records = parse_sitemap(&resource.body, &resource.content_type)?;
    tracing::info!(url = %resource.url, records = records.len(), "Parsed sitemap");

    if let Some(observer) = progress {
        observer("Processing complete", 100);
    }
    Ok(records)
}
