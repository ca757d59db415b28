//! Per-scrape working record
//!
//! A `Meta` is created at request entry, carries the canonicalized
//! URL, merged options and feature flags through every engine
//! attempt, and owns the cancellation resources released when the
//! pipeline returns.

use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::abort::{AbortHandle, AbortManager};
use crate::error::{EngineError, PipelineResult};
use crate::scrape::options::ScrapeOptions;

/// Closed set of markers influencing engine-list construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub pdf: bool,
    pub document: bool,
    pub wait_for: bool,
}

impl FeatureFlags {
    /// Merge another flag set in, reporting whether anything changed.
    pub fn merge(&mut self, other: FeatureFlags) -> bool {
        let before = *self;
        self.pdf |= other.pdf;
        self.document |= other.document;
        self.wait_for |= other.wait_for;
        *self != before
    }

    #[must_use]
    pub fn pdf() -> Self {
        Self {
            pdf: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn document() -> Self {
        Self {
            document: true,
            ..Self::default()
        }
    }
}

const DOCUMENT_SUFFIXES: &[&str] = &[".docx", ".doc", ".odt", ".rtf", ".xlsx", ".xls"];

/// Derive the initial flag set from the URL path and options, before
/// any engine has run.
#[must_use]
pub fn detect_features(url: &Url, options: &ScrapeOptions) -> FeatureFlags {
    let path = url.path().to_ascii_lowercase();
    FeatureFlags {
        pdf: path.ends_with(".pdf"),
        document: DOCUMENT_SUFFIXES.iter().any(|s| path.ends_with(s)),
        wait_for: options.wait_for_ms() > 0,
    }
}

/// Normalize a caller-supplied URL: default the scheme to https,
/// drop the fragment, reject non-http schemes.
pub fn canonicalize_url(raw: &str) -> PipelineResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Fetch("empty URL".to_string()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let mut url = Url::parse(&candidate)
        .map_err(|e| EngineError::Fetch(format!("invalid URL {trimmed}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(EngineError::Fetch(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    url.set_fragment(None);
    Ok(url)
}

/// The per-scrape working record
pub struct Meta {
    pub id: String,
    /// URL exactly as the caller supplied it
    pub source_url: String,
    /// Canonicalized form every engine operates on
    pub url: Url,
    pub options: ScrapeOptions,
    pub features: FeatureFlags,
    pub abort: AbortManager,
}

impl Meta {
    /// Build the working record for one scrape. `parent` chains the
    /// crawl-level or server-level abort signal into this scrape.
    pub fn build(
        raw_url: &str,
        options: ScrapeOptions,
        parent: Option<AbortHandle>,
    ) -> PipelineResult<Self> {
        let url = canonicalize_url(raw_url)?;
        let features = detect_features(&url, &options);
        let abort = AbortManager::new(parent, Some(Duration::from_millis(options.timeout_ms())));
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            source_url: raw_url.to_string(),
            url,
            options,
            features,
            abort,
        })
    }
}
