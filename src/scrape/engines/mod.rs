//! Acquisition engines
//!
//! Each engine knows how to acquire bytes for a URL one way: direct
//! HTTP fetch, delegation to the rendering microservice, PDF
//! download/extraction, or office-document download. Engines report a
//! tagged outcome instead of throwing; the orchestrator matches on it
//! to decide between acceptance, fallback and feature escalation.

pub mod browser;
pub mod document;
pub mod fetch;
pub mod pdf;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::dispatch::Dispatchers;
use crate::error::EngineError;
use crate::scrape::document::{PdfMetadata, ProxyTag, RenderStatus};
use crate::scrape::meta::{FeatureFlags, Meta};

pub use fetch::ValidatorCache;

/// The closed set of engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Fetch,
    Browser,
    Pdf,
    Document,
}

impl EngineKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Browser => "browser",
            Self::Pdf => "pdf",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What one engine attempt produced
#[derive(Debug, Clone)]
pub struct EngineResult {
    /// URL after redirects
    pub final_url: String,
    /// Page HTML, extracted text, or base64 body for pass-through PDF
    pub html: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub proxy_used: ProxyTag,
    pub render_status: Option<RenderStatus>,
    pub pdf_metadata: Option<PdfMetadata>,
    /// Markdown the engine already derived (PDF text extraction)
    pub markdown: Option<String>,
    /// Gatekeeper evidence supplied by the rendering microservice
    pub upstream_evidence: Option<serde_json::Value>,
    /// Set-Cookie presence on the upstream response, for the browser
    /// challenge-retry policy
    pub set_cookie: bool,
}

impl EngineResult {
    #[must_use]
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status_code) || self.status_code == 304
    }
}

/// Tagged result of one engine attempt
#[derive(Debug)]
pub enum EngineOutcome {
    /// The engine acquired something worth evaluating
    Ok(EngineResult),
    /// The response revealed a specialty body; restart with new flags
    Escalate(FeatureFlags),
    /// Transport-class failure; advance the engine list
    Transport(EngineError),
    /// The engine ran but produced nothing usable
    Unsuccessful,
}

/// Shared dependencies every engine borrows
#[derive(Clone, Copy)]
pub struct EngineDeps<'a> {
    pub config: &'a AppConfig,
    pub dispatchers: &'a Dispatchers,
    pub validator_cache: &'a ValidatorCache,
}

/// One acquisition strategy
#[async_trait]
pub trait Engine: Send + Sync {
    fn kind(&self) -> EngineKind;

    async fn run(&self, meta: &Meta) -> EngineOutcome;
}

/// Deterministic engine-order construction from the feature flags.
#[must_use]
pub fn engine_order(features: FeatureFlags, browser_configured: bool) -> Vec<EngineKind> {
    let mut order = Vec::with_capacity(3);
    if features.document {
        order.push(EngineKind::Document);
    } else if features.pdf {
        order.push(EngineKind::Pdf);
    }
    if browser_configured {
        order.push(EngineKind::Browser);
    }
    order.push(EngineKind::Fetch);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_order_is_fetch_only() {
        assert_eq!(
            engine_order(FeatureFlags::default(), false),
            vec![EngineKind::Fetch]
        );
    }

    #[test]
    fn browser_slots_before_fetch() {
        assert_eq!(
            engine_order(FeatureFlags::default(), true),
            vec![EngineKind::Browser, EngineKind::Fetch]
        );
    }

    #[test]
    fn pdf_flag_prepends_pdf() {
        assert_eq!(
            engine_order(FeatureFlags::pdf(), true),
            vec![EngineKind::Pdf, EngineKind::Browser, EngineKind::Fetch]
        );
    }

    #[test]
    fn document_flag_wins_over_pdf() {
        let mut features = FeatureFlags::pdf();
        features.merge(FeatureFlags::document());
        assert_eq!(
            engine_order(features, false),
            vec![EngineKind::Document, EngineKind::Fetch]
        );
    }
}
