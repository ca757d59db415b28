//! Per-request scrape options
//!
//! A closed struct with explicit optional fields mirroring the wire
//! shape, plus a validator that reports precise per-field errors.
//! Accessors apply the documented defaulting rules so the rest of the
//! pipeline never re-derives them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Requested output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    Markdown,
    Html,
    RawHtml,
    Links,
    Images,
}

/// A format entry on the wire: either `"markdown"` or
/// `{"type": "markdown"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatSpec {
    Name(Format),
    Object {
        #[serde(rename = "type")]
        kind: Format,
    },
}

impl FormatSpec {
    #[must_use]
    pub fn format(&self) -> Format {
        match self {
            Self::Name(f) | Self::Object { kind: f } => *f,
        }
    }
}

/// A parser entry on the wire: `"pdf"` or `{"type": "pdf", "maxPages": N}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParserSpec {
    Name(String),
    Config {
        #[serde(rename = "type")]
        kind: String,
        #[serde(rename = "maxPages")]
        max_pages: Option<u32>,
    },
}

/// How the PDF engine should treat a PDF body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfMode {
    /// Return the raw bytes base64-encoded without parsing
    PassThrough,
    /// Extract text and page metadata, capped at `max_pages` when set
    Parse { max_pages: Option<u32> },
}

/// Immutable options for a single scrape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<FormatSpec>,
    pub only_main_content: Option<bool>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_tags: Vec<String>,
    /// Total scrape budget in milliseconds.
    pub timeout: Option<u64>,
    /// Idle time the browser engine waits after load, milliseconds.
    pub wait_for: Option<u64>,
    pub parsers: Option<Vec<ParserSpec>>,
    /// Absent defaults to true unless custom headers were supplied;
    /// authenticated calls are assumed to target hardened TLS.
    pub skip_tls_verification: Option<bool>,
    pub remove_base64_images: Option<bool>,
}

/// One field-level validation failure
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_TIMEOUT_MS: u64 = 600_000;
const MAX_WAIT_FOR_MS: u64 = 60_000;

impl ScrapeOptions {
    /// Validate every field, returning all failures at once.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if let Some(timeout) = self.timeout {
            if timeout == 0 || timeout > MAX_TIMEOUT_MS {
                errors.push(FieldError {
                    field: "timeout",
                    message: format!("must be between 1 and {MAX_TIMEOUT_MS} ms"),
                });
            }
        }

        if let Some(wait_for) = self.wait_for {
            if wait_for > MAX_WAIT_FOR_MS {
                errors.push(FieldError {
                    field: "waitFor",
                    message: format!("must be at most {MAX_WAIT_FOR_MS} ms"),
                });
            }
        }

        for (selectors, field) in [
            (&self.include_tags, "includeTags"),
            (&self.exclude_tags, "excludeTags"),
        ] {
            for tag in selectors {
                if scraper::Selector::parse(tag).is_err() {
                    errors.push(FieldError {
                        field,
                        message: format!("invalid selector: {tag}"),
                    });
                }
            }
        }

        if let Some(parsers) = &self.parsers {
            for parser in parsers {
                let kind = match parser {
                    ParserSpec::Name(name) => name.as_str(),
                    ParserSpec::Config { kind, .. } => kind.as_str(),
                };
                if kind != "pdf" {
                    errors.push(FieldError {
                        field: "parsers",
                        message: format!("unknown parser: {kind}"),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Requested formats, deduplicated in first-seen order;
    /// `[markdown]` when none were requested.
    #[must_use]
    pub fn requested_formats(&self) -> Vec<Format> {
        if self.formats.is_empty() {
            return vec![Format::Markdown];
        }
        let mut seen = std::collections::HashSet::new();
        self.formats
            .iter()
            .map(FormatSpec::format)
            .filter(|f| seen.insert(*f))
            .collect()
    }

    #[must_use]
    pub fn wants(&self, format: Format) -> bool {
        self.requested_formats().contains(&format)
    }

    #[must_use]
    pub fn only_main_content(&self) -> bool {
        self.only_main_content.unwrap_or(true)
    }

    #[must_use]
    pub fn remove_base64_images(&self) -> bool {
        self.remove_base64_images.unwrap_or(true)
    }

    /// Custom headers relax TLS by default; supplying headers implies
    /// an authenticated call against a properly-certified host.
    #[must_use]
    pub fn skip_tls(&self) -> bool {
        self.skip_tls_verification.unwrap_or(self.headers.is_empty())
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    #[must_use]
    pub fn wait_for_ms(&self) -> u64 {
        self.wait_for.unwrap_or(0)
    }

    /// PDF handling mode. Absent `parsers` keeps the parsing default;
    /// pass-through requires an explicit empty parser list.
    #[must_use]
    pub fn pdf_mode(&self) -> PdfMode {
        match &self.parsers {
            None => PdfMode::Parse { max_pages: None },
            Some(parsers) => {
                for parser in parsers {
                    match parser {
                        ParserSpec::Name(name) if name == "pdf" => {
                            return PdfMode::Parse { max_pages: None };
                        }
                        ParserSpec::Config { kind, max_pages } if kind == "pdf" => {
                            return PdfMode::Parse {
                                max_pages: *max_pages,
                            };
                        }
                        _ => {}
                    }
                }
                PdfMode::PassThrough
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_markdown() {
        let options = ScrapeOptions::default();
        assert_eq!(options.requested_formats(), vec![Format::Markdown]);
    }

    #[test]
    fn formats_accept_both_wire_shapes() {
        let options: ScrapeOptions = serde_json::from_str(
            r#"{"formats": ["links", {"type": "markdown"}, "links"]}"#,
        )
        .unwrap();
        assert_eq!(
            options.requested_formats(),
            vec![Format::Links, Format::Markdown]
        );
    }

    #[test]
    fn skip_tls_defaults_flip_on_custom_headers() {
        let bare = ScrapeOptions::default();
        assert!(bare.skip_tls());

        let mut with_headers = ScrapeOptions::default();
        with_headers
            .headers
            .insert("Authorization".to_string(), "Bearer x".to_string());
        assert!(!with_headers.skip_tls());

        let explicit = ScrapeOptions {
            skip_tls_verification: Some(true),
            ..with_headers
        };
        assert!(explicit.skip_tls());
    }

    #[test]
    fn pdf_mode_parses_both_parser_shapes() {
        let plain: ScrapeOptions = serde_json::from_str(r#"{"parsers": ["pdf"]}"#).unwrap();
        assert_eq!(plain.pdf_mode(), PdfMode::Parse { max_pages: None });

        let capped: ScrapeOptions =
            serde_json::from_str(r#"{"parsers": [{"type": "pdf", "maxPages": 5}]}"#).unwrap();
        assert_eq!(
            capped.pdf_mode(),
            PdfMode::Parse {
                max_pages: Some(5)
            }
        );

        let none: ScrapeOptions = serde_json::from_str(r#"{"parsers": []}"#).unwrap();
        assert_eq!(none.pdf_mode(), PdfMode::PassThrough);
    }

    #[test]
    fn validator_reports_each_bad_field() {
        let options: ScrapeOptions = serde_json::from_str(
            r#"{"timeout": 0, "includeTags": ["<<<"], "parsers": ["docx"]}"#,
        )
        .unwrap();
        let errors = options.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"timeout"));
        assert!(fields.contains(&"includeTags"));
        assert!(fields.contains(&"parsers"));
    }

    #[test]
    fn wait_for_bound_is_enforced() {
        let options = ScrapeOptions {
            wait_for: Some(120_000),
            ..ScrapeOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
