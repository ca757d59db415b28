//! Content-type sniffing for feature escalation
//!
//! After a fetch response arrives, the sniffer inspects its headers.
//! A PDF or office-document content type on a URL that was not
//! flagged for it escalates the matching feature flag, which restarts
//! the engine fallback list with the specialty engine prepended.

use crate::scrape::meta::FeatureFlags;

const OFFICE_MIME_PREFIXES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.ms-excel",
    "application/msword",
    "application/rtf",
    "text/rtf",
];

/// What the response headers revealed about the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffVerdict {
    /// Nothing special; proceed with the current engine
    Plain,
    /// Body is a PDF; escalate the pdf flag
    Pdf,
    /// Body is an office document; escalate the document flag
    Document,
}

impl SniffVerdict {
    /// The flag set this verdict escalates to, if any.
    #[must_use]
    pub fn escalation(self) -> Option<FeatureFlags> {
        match self {
            Self::Plain => None,
            Self::Pdf => Some(FeatureFlags::pdf()),
            Self::Document => Some(FeatureFlags::document()),
        }
    }
}

/// Inspect a response content type.
#[must_use]
pub fn sniff_content_type(content_type: Option<&str>) -> SniffVerdict {
    let Some(content_type) = content_type else {
        return SniffVerdict::Plain;
    };
    let normalized = content_type.trim().to_ascii_lowercase();
    if normalized.starts_with("application/pdf") {
        return SniffVerdict::Pdf;
    }
    if OFFICE_MIME_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
    {
        return SniffVerdict::Document;
    }
    SniffVerdict::Plain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_content_type_escalates() {
        let verdict = sniff_content_type(Some("application/pdf; charset=binary"));
        assert_eq!(verdict, SniffVerdict::Pdf);
        assert!(verdict.escalation().unwrap().pdf);
    }

    #[test]
    fn office_content_types_escalate() {
        for mime in [
            "application/msword",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "text/rtf",
        ] {
            assert_eq!(sniff_content_type(Some(mime)), SniffVerdict::Document);
        }
    }

    #[test]
    fn html_is_plain() {
        assert_eq!(
            sniff_content_type(Some("text/html; charset=utf-8")),
            SniffVerdict::Plain
        );
        assert_eq!(sniff_content_type(None), SniffVerdict::Plain);
    }
}
