//! Single-page scrape pipeline
//!
//! Entry point for turning one URL into a document: build the working
//! record, apply policy checks, then hand off to the engine-fallback
//! orchestrator.

pub mod document;
pub mod engines;
pub mod meta;
pub mod options;
pub mod orchestrator;
pub mod sniffer;

use crate::abort::AbortHandle;
use crate::context::AppContext;
use crate::error::{EngineError, PipelineResult};
use crate::robots::DEFAULT_AGENT_TOKENS;

pub use document::{Document, DocumentMetadata, ProxyTag, RenderStatus};
pub use meta::Meta;
pub use options::{Format, ScrapeOptions};

/// Scrape one URL into a document.
///
/// `parent` chains an outer cancellation tier (crawl- or
/// server-level) into this scrape's abort manager.
pub async fn scrape_url(
    ctx: &AppContext,
    url: &str,
    options: ScrapeOptions,
    parent: Option<AbortHandle>,
) -> PipelineResult<Document> {
    let mut meta = Meta::build(url, options, parent)?;

    if ctx.blocklist.is_blocked(&meta.url) {
        return Err(EngineError::CrawlDenied(format!(
            "domain is blocklisted: {}",
            meta.url.host_str().unwrap_or_default()
        )));
    }

    if ctx.config.check_robots_on_scrape {
        let allowed = ctx
            .robots
            .is_allowed(&ctx.dispatchers, &meta.url, DEFAULT_AGENT_TOKENS)
            .await;
        if !allowed {
            return Err(EngineError::CrawlDenied(format!(
                "robots.txt disallows {}",
                meta.url
            )));
        }
    }

    tracing::info!(request_id = %meta.id, url = %meta.url, "scrape started");
    let result = orchestrator::run(ctx, &mut meta).await;
    match &result {
        Ok(_) => tracing::info!(request_id = %meta.id, url = %meta.url, "scrape finished"),
        Err(e) => {
            tracing::warn!(request_id = %meta.id, url = %meta.url, error = %e, "scrape failed");
        }
    }
    result
}
