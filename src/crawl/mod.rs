//! Bounded site crawl
//!
//! Seeds a FIFO frontier from the initial URL and sitemap discovery,
//! pops URLs through the scrape pipeline with a small worker pool,
//! extracts links from successful pages and feeds them back through
//! the filter until the queue drains or the processing limit is hit.

pub mod blocklist;
pub mod filter;

use std::collections::{HashMap, HashSet, VecDeque};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::abort::AbortHandle;
use crate::context::AppContext;
use crate::error::{EngineError, PipelineResult};
use crate::robots::DEFAULT_AGENT_TOKENS;
use crate::scrape::document::Document;
use crate::scrape::meta::canonicalize_url;
use crate::scrape::options::{FieldError, Format, FormatSpec, ScrapeOptions};
use crate::scrape::scrape_url;
use crate::sitemap;
use crate::transform::extract_links;
use filter::LinkFilter;

pub const DEFAULT_CRAWL_LIMIT: usize = 100;
pub const MAX_CRAWL_LIMIT: usize = 10_000;
pub const DEFAULT_MAX_DEPTH: usize = 2;
pub const MAX_MAX_DEPTH: usize = 20;

/// Options for one crawl
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOptions {
    pub limit: Option<usize>,
    pub max_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub allow_backward_crawling: bool,
    #[serde(default)]
    pub allow_external_content_links: bool,
    #[serde(default)]
    pub allow_subdomains: bool,
    #[serde(default)]
    pub regex_on_full_url: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    pub scrape_options: Option<ScrapeOptions>,
}

impl CrawlOptions {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_CRAWL_LIMIT {
                errors.push(FieldError {
                    field: "limit",
                    message: format!("must be between 1 and {MAX_CRAWL_LIMIT}"),
                });
            }
        }
        if let Some(depth) = self.max_depth {
            if depth > MAX_MAX_DEPTH {
                errors.push(FieldError {
                    field: "maxDepth",
                    message: format!("must be at most {MAX_MAX_DEPTH}"),
                });
            }
        }
        if let Some(scrape_options) = &self.scrape_options {
            if let Err(mut nested) = scrape_options.validate() {
                errors.append(&mut nested);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_CRAWL_LIMIT).min(MAX_CRAWL_LIMIT)
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH).min(MAX_MAX_DEPTH)
    }
}

/// Crawl accounting, reported with the response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub discovered: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// One per-URL failure inside an otherwise successful crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlPageError {
    pub url: String,
    pub code: String,
    pub message: String,
}

/// The crawl response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlOutput {
    pub pages: Vec<Document>,
    pub errors: Vec<CrawlPageError>,
    pub stats: CrawlStats,
}

/// Scrape options used for frontier pages: the caller's options with
/// crawl-level headers merged in and `rawHtml` force-added so link
/// extraction is possible.
fn frontier_scrape_options(options: &CrawlOptions) -> (ScrapeOptions, bool) {
    let mut scrape = options.scrape_options.clone().unwrap_or_default();
    for (name, value) in &options.headers {
        scrape
            .headers
            .entry(name.clone())
            .or_insert_with(|| value.clone());
    }
    let caller_wanted_raw = scrape.wants(Format::RawHtml);
    if !caller_wanted_raw {
        if scrape.formats.is_empty() {
            // Preserve the implicit markdown default before adding.
            scrape.formats.push(FormatSpec::Name(Format::Markdown));
        }
        scrape.formats.push(FormatSpec::Name(Format::RawHtml));
    }
    (scrape, caller_wanted_raw)
}

struct Frontier {
    queue: VecDeque<(String, usize)>,
    discovered: HashSet<String>,
}

impl Frontier {
    fn new(seed: &Url) -> Self {
        let mut discovered = HashSet::new();
        discovered.insert(seed.to_string());
        let mut queue = VecDeque::new();
        queue.push_back((seed.to_string(), 0));
        Self { queue, discovered }
    }

    /// Enqueue a filtered URL unless it was ever seen before.
    fn push(&mut self, url: Url, depth: usize) -> bool {
        let key = url.to_string();
        if self.discovered.insert(key.clone()) {
            self.queue.push_back((key, depth));
            true
        } else {
            false
        }
    }
}

/// Run a bounded crawl rooted at `url`.
pub async fn crawl_site(
    ctx: &AppContext,
    url: &str,
    options: CrawlOptions,
    parent: Option<AbortHandle>,
) -> PipelineResult<CrawlOutput> {
    let initial = canonicalize_url(url)?;
    if ctx.blocklist.is_blocked(&initial) {
        return Err(EngineError::CrawlDenied(format!(
            "domain is blocklisted: {}",
            initial.host_str().unwrap_or_default()
        )));
    }

    let link_filter = LinkFilter::new(
        initial.clone(),
        &options.includes,
        &options.excludes,
        options.regex_on_full_url,
        options.allow_subdomains,
        options.allow_external_content_links,
        options.allow_backward_crawling,
        Some(&ctx.blocklist),
    )
    .map_err(|errors| {
        EngineError::Internal(format!(
            "invalid crawl patterns: {}",
            errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ))
    })?;

    let limit = options.limit();
    let max_depth = options.max_depth();
    let (scrape_options, caller_wanted_raw) = frontier_scrape_options(&options);
    let concurrency = ctx.config.crawl_concurrency.max(1);

    let mut frontier = Frontier::new(&initial);
    let mut output = CrawlOutput::default();

    // Sitemap discovery seeds the frontier through the same filter as
    // in-page links.
    let sitemap_root = initial
        .join("/sitemap.xml")
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{initial}sitemap.xml"));
    let sitemap_result = sitemap::walk_sitemaps(&ctx.dispatchers, &sitemap_root, |urls| {
        for raw in urls {
            if let Ok(parsed) = link_filter.evaluate(&raw) {
                frontier.push(parsed, 1);
            }
        }
    })
    .await;
    if let Err(e) = sitemap_result {
        tracing::debug!(url = %sitemap_root, error = %e, "sitemap discovery unavailable");
    }

    let mut in_flight = FuturesUnordered::new();
    let mut started = 0usize;

    loop {
        // Keep the pool full while budget remains.
        while in_flight.len() < concurrency && started < limit {
            let Some((next_url, depth)) = frontier.queue.pop_front() else {
                break;
            };

            let parsed = match Url::parse(&next_url) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            let allowed = ctx
                .robots
                .is_allowed(&ctx.dispatchers, &parsed, DEFAULT_AGENT_TOKENS)
                .await;
            if !allowed {
                tracing::debug!(url = %next_url, "robots.txt disallows; skipping");
                output.errors.push(CrawlPageError {
                    url: next_url,
                    code: "CRAWL_DENIED".to_string(),
                    message: "robots.txt disallows this URL".to_string(),
                });
                continue;
            }

            started += 1;
            let scrape_options = scrape_options.clone();
            let parent = parent.clone();
            in_flight.push(async move {
                let result = scrape_url(ctx, &next_url, scrape_options, parent).await;
                (next_url, depth, result)
            });
        }

        let Some((page_url, depth, result)) = in_flight.next().await else {
            break;
        };
        output.stats.processed += 1;

        match result {
            Ok(mut document) => {
                output.stats.succeeded += 1;

                if depth < max_depth {
                    if let Some(raw_html) = document.raw_html.as_deref() {
                        let base = Url::parse(&document.metadata.url)
                            .unwrap_or_else(|_| initial.clone());
                        for link in extract_links(raw_html, &base) {
                            if let Ok(parsed) = link_filter.evaluate(&link) {
                                frontier.push(parsed, depth + 1);
                            }
                        }
                    }
                }

                if !caller_wanted_raw {
                    document.raw_html = None;
                }
                output.pages.push(document);
            }
            Err(error) => {
                output.stats.failed += 1;
                output.errors.push(CrawlPageError {
                    url: page_url,
                    code: error.public_code().to_string(),
                    message: error.to_string(),
                });
                if matches!(error, EngineError::Aborted) {
                    tracing::info!("crawl aborted by caller; stopping frontier");
                    break;
                }
            }
        }

        if output.stats.processed >= limit {
            break;
        }
        if in_flight.is_empty() && frontier.queue.is_empty() {
            break;
        }
    }

    output.stats.discovered = frontier.discovered.len();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_clamp_to_bounds() {
        let options = CrawlOptions {
            limit: Some(50_000),
            max_depth: Some(50),
            ..CrawlOptions::default()
        };
        assert!(options.validate().is_err());
        assert_eq!(options.limit(), MAX_CRAWL_LIMIT);
        assert_eq!(options.max_depth(), MAX_MAX_DEPTH);
    }

    #[test]
    fn defaults_match_the_contract() {
        let options = CrawlOptions::default();
        assert_eq!(options.limit(), DEFAULT_CRAWL_LIMIT);
        assert_eq!(options.max_depth(), DEFAULT_MAX_DEPTH);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn frontier_never_enqueues_twice() {
        let seed = Url::parse("https://example.com/").unwrap();
        let mut frontier = Frontier::new(&seed);
        let url = Url::parse("https://example.com/a").unwrap();
        assert!(frontier.push(url.clone(), 1));
        assert!(!frontier.push(url, 1));
        assert_eq!(frontier.queue.len(), 2);
        assert_eq!(frontier.discovered.len(), 2);
    }

    #[test]
    fn frontier_options_force_raw_html() {
        let options = CrawlOptions::default();
        let (scrape, caller_wanted) = frontier_scrape_options(&options);
        assert!(!caller_wanted);
        assert!(scrape.wants(Format::RawHtml));
        assert!(scrape.wants(Format::Markdown));
    }

    #[test]
    fn crawl_headers_merge_under_scrape_headers() {
        let mut crawl_headers = HashMap::new();
        crawl_headers.insert("X-Both".to_string(), "crawl".to_string());
        crawl_headers.insert("X-Crawl".to_string(), "1".to_string());

        let mut scrape_headers = HashMap::new();
        scrape_headers.insert("X-Both".to_string(), "scrape".to_string());

        let options = CrawlOptions {
            headers: crawl_headers,
            scrape_options: Some(ScrapeOptions {
                headers: scrape_headers,
                ..ScrapeOptions::default()
            }),
            ..CrawlOptions::default()
        };
        let (scrape, _) = frontier_scrape_options(&options);
        assert_eq!(scrape.headers["X-Both"], "scrape");
        assert_eq!(scrape.headers["X-Crawl"], "1");
    }
}
