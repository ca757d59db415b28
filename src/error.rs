//! Error types for the scrape/crawl pipeline
//!
//! This module defines the engine-level error taxonomy with
//! classification helpers plus the stable public error codes exposed
//! at the HTTP boundary.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, EngineError>;

/// Error types produced by acquisition engines and the surrounding
/// pipeline
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// TLS handshake or certificate failure
    #[error("SSL error: {0}")]
    Ssl(String),

    /// Hostname could not be resolved
    #[error("DNS resolution failed for {0}")]
    DnsResolution(String),

    /// Egress guard refused a connection into a non-public address range
    #[error("Connection to {0} refused: resolves to a private address range")]
    InsecureConnection(String),

    /// Proxy could not be constructed or selected
    #[error("Proxy selection failed: {0}")]
    ProxySelection(String),

    /// Generic network/transport failure during acquisition
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The engine ran but produced no usable content
    #[error("Engine {0} returned no usable content")]
    Unsuccessful(&'static str),

    /// PDF download was intercepted by an antibot page
    #[error("PDF download blocked by antibot challenge")]
    PdfAntibot,

    /// Document download was intercepted by an antibot page
    #[error("Document download blocked by antibot challenge")]
    DocumentAntibot,

    /// Remaining scrape budget is too small to parse the PDF
    #[error("Insufficient time to parse PDF: {pages} pages need ~{needed_ms}ms, {remaining_ms}ms left")]
    PdfInsufficientTime {
        pages: u32,
        needed_ms: u64,
        remaining_ms: u64,
    },

    /// The per-scrape timeout fired
    #[error("Scrape timed out")]
    Timeout,

    /// An external (caller/crawl-level) abort fired
    #[error("Scrape aborted by caller")]
    Aborted,

    /// Every engine in every round was exhausted without acceptance
    #[error("All engines exhausted without acceptable content")]
    NoEnginesLeft,

    /// Request was denied by robots.txt or the domain blocklist
    #[error("Crawl denied: {0}")]
    CrawlDenied(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error advances the fallback list rather than
    /// terminating the scrape
    #[must_use]
    pub fn advances_fallback(&self) -> bool {
        matches!(
            self,
            Self::Ssl(_)
                | Self::DnsResolution(_)
                | Self::InsecureConnection(_)
                | Self::ProxySelection(_)
                | Self::Fetch(_)
                | Self::Unsuccessful(_)
                | Self::PdfAntibot
                | Self::DocumentAntibot
                | Self::PdfInsufficientTime { .. }
        )
    }

    /// Whether this error came from a cancellation tier; the
    /// orchestrator never retries after one of these
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Timeout | Self::Aborted)
    }

    /// Stable public error code for the HTTP boundary
    #[must_use]
    pub fn public_code(&self) -> &'static str {
        match self {
            Self::Ssl(_) => "SSL_ERROR",
            Self::DnsResolution(_) => "DNS_ERROR",
            Self::InsecureConnection(_) => "INSECURE_CONNECTION",
            Self::ProxySelection(_) => "PROXY_ERROR",
            Self::Fetch(_) | Self::Unsuccessful(_) => "FETCH_ERROR",
            Self::PdfAntibot | Self::DocumentAntibot => "ANTIBOT_BLOCKED",
            Self::PdfInsufficientTime { .. } => "PDF_TIMEOUT",
            Self::Timeout => "SCRAPE_TIMEOUT",
            Self::Aborted => "ABORTED",
            Self::NoEnginesLeft => "NO_ENGINES",
            Self::CrawlDenied(_) => "CRAWL_DENIED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Public message, safe to expose without detail flags
    #[must_use]
    pub fn public_message(&self, expose_details: bool) -> String {
        if expose_details {
            self.to_string()
        } else {
            match self {
                Self::Timeout => "Scrape timed out".to_string(),
                Self::CrawlDenied(_) => "Crawl denied by policy".to_string(),
                Self::NoEnginesLeft => {
                    "All engines exhausted without acceptable content".to_string()
                }
                _ => "Upstream acquisition failed".to_string(),
            }
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_advance_fallback() {
        assert!(EngineError::Ssl("expired".into()).advances_fallback());
        assert!(EngineError::DnsResolution("nxdomain".into()).advances_fallback());
        assert!(EngineError::Unsuccessful("fetch").advances_fallback());
    }

    #[test]
    fn cancellation_is_terminal() {
        assert!(!EngineError::Timeout.advances_fallback());
        assert!(EngineError::Timeout.is_cancellation());
        assert!(EngineError::Aborted.is_cancellation());
        assert!(!EngineError::Fetch("reset".into()).is_cancellation());
    }

    #[test]
    fn every_error_maps_to_a_stable_public_code() {
        let samples = [
            EngineError::Ssl("x".into()),
            EngineError::DnsResolution("x".into()),
            EngineError::InsecureConnection("x".into()),
            EngineError::ProxySelection("x".into()),
            EngineError::Fetch("x".into()),
            EngineError::Unsuccessful("fetch"),
            EngineError::PdfAntibot,
            EngineError::DocumentAntibot,
            EngineError::PdfInsufficientTime {
                pages: 10,
                needed_ms: 1500,
                remaining_ms: 100,
            },
            EngineError::Timeout,
            EngineError::Aborted,
            EngineError::NoEnginesLeft,
            EngineError::CrawlDenied("robots".into()),
            EngineError::Internal("x".into()),
        ];
        for error in samples {
            assert!(!error.public_code().is_empty());
            assert!(error.public_code().chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn public_messages_redact_without_flag() {
        let err = EngineError::Fetch("connection reset by 10.0.0.5".into());
        assert!(!err.public_message(false).contains("10.0.0.5"));
        assert!(err.public_message(true).contains("10.0.0.5"));
    }
}
