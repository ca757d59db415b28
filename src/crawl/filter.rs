//! Crawl link filtering
//!
//! The ordered policy every candidate URL passes before it may enter
//! the frontier: parseability, include/exclude regexes, scheme, host
//! scoping, external-content allowance, backward-path containment,
//! the non-HTML file check and the domain blocklist.

use regex::Regex;
use url::Url;

use crate::scrape::options::FieldError;

use super::blocklist::Blocklist;

/// Extensions treated as crawlable documents even off-host.
const CONTENT_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".odt", ".rtf", ".xlsx", ".xls",
];

/// Extensions that never yield HTML worth crawling.
const FILE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".ico", ".bmp", ".mp4", ".webm", ".avi",
    ".mov", ".mkv", ".mp3", ".wav", ".ogg", ".zip", ".tar", ".gz", ".tgz", ".rar", ".7z", ".css",
    ".js", ".woff", ".woff2", ".ttf", ".eot", ".json", ".xml",
];

/// Why a candidate link was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unparsable,
    ExcludedPattern,
    NotIncluded,
    Scheme,
    ExternalHost,
    BackwardPath,
    NonHtmlFile,
    BlockedDomain,
}

/// Compiled filter policy for one crawl
pub struct LinkFilter<'a> {
    initial: Url,
    initial_host: String,
    initial_path_prefix: String,
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
    regex_on_full_url: bool,
    allow_subdomains: bool,
    allow_external_content_links: bool,
    allow_backward_crawling: bool,
    blocklist: Option<&'a Blocklist>,
}

fn compile_patterns(patterns: &[String], field: &'static str) -> Result<Vec<Regex>, FieldError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| FieldError {
                field,
                message: format!("invalid pattern {p}: {e}"),
            })
        })
        .collect()
}

fn path_extension(path: &str) -> Option<String> {
    let file = path.rsplit('/').next()?;
    let dot = file.rfind('.')?;
    Some(file[dot..].to_ascii_lowercase())
}

fn is_content_file(path: &str) -> bool {
    path_extension(path)
        .map(|ext| CONTENT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn is_non_html_file(path: &str) -> bool {
    match path_extension(path) {
        Some(ext) => {
            !CONTENT_EXTENSIONS.contains(&ext.as_str()) && FILE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Host equality for subdomain mode: same registered suffix.
fn same_registered_domain(host: &str, initial_host: &str) -> bool {
    host == initial_host
        || host.ends_with(&format!(".{initial_host}"))
        || initial_host.ends_with(&format!(".{host}"))
}

impl<'a> LinkFilter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        initial: Url,
        includes: &[String],
        excludes: &[String],
        regex_on_full_url: bool,
        allow_subdomains: bool,
        allow_external_content_links: bool,
        allow_backward_crawling: bool,
        blocklist: Option<&'a Blocklist>,
    ) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let includes = match compile_patterns(includes, "includes") {
            Ok(includes) => includes,
            Err(e) => {
                errors.push(e);
                Vec::new()
            }
        };
        let excludes = match compile_patterns(excludes, "excludes") {
            Ok(excludes) => excludes,
            Err(e) => {
                errors.push(e);
                Vec::new()
            }
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        let initial_host = initial.host_str().unwrap_or_default().to_ascii_lowercase();
        // Backward containment compares against the directory of the
        // initial path.
        let initial_path_prefix = {
            let path = initial.path();
            match path.rfind('/') {
                Some(idx) => path[..=idx].to_string(),
                None => "/".to_string(),
            }
        };

        Ok(Self {
            initial,
            initial_host,
            initial_path_prefix,
            includes,
            excludes,
            regex_on_full_url,
            allow_subdomains,
            allow_external_content_links,
            allow_backward_crawling,
            blocklist,
        })
    }

    /// Apply the ordered policy to one candidate.
    pub fn evaluate(&self, raw: &str) -> Result<Url, DenyReason> {
        let url = Url::parse(raw).map_err(|_| DenyReason::Unparsable)?;

        let regex_target = if self.regex_on_full_url {
            url.as_str().to_string()
        } else {
            let mut stripped = url.clone();
            stripped.set_query(None);
            stripped.set_fragment(None);
            stripped.to_string()
        };

        if self.excludes.iter().any(|re| re.is_match(&regex_target)) {
            return Err(DenyReason::ExcludedPattern);
        }
        if !self.includes.is_empty() && !self.includes.iter().any(|re| re.is_match(&regex_target)) {
            return Err(DenyReason::NotIncluded);
        }

        if !matches!(url.scheme(), "http" | "https") {
            return Err(DenyReason::Scheme);
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let host_matches = if self.allow_subdomains {
            same_registered_domain(&host, &self.initial_host)
        } else {
            host == self.initial_host
        };

        if !host_matches {
            // Off-host links only survive as explicit content files,
            // and still go through the blocklist below.
            if !(self.allow_external_content_links && is_content_file(url.path())) {
                return Err(DenyReason::ExternalHost);
            }
        } else {
            if !self.allow_backward_crawling
                && !url.path().starts_with(&self.initial_path_prefix)
            {
                return Err(DenyReason::BackwardPath);
            }

            if is_non_html_file(url.path()) {
                return Err(DenyReason::NonHtmlFile);
            }
        }

        if let Some(blocklist) = self.blocklist {
            if blocklist.is_blocked(&url) {
                return Err(DenyReason::BlockedDomain);
            }
        }

        Ok(url)
    }

    #[must_use]
    pub fn initial_url(&self) -> &Url {
        &self.initial
    }
}
