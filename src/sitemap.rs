//! Sitemap processing
//!
//! Iteratively walks a sitemap graph with an explicit queue and a
//! visited set, bounded by a global URL cap. Index documents enqueue
//! further sitemaps; URL sets are handed to the caller. Gzip sitemaps
//! are inflated in memory; malformed XML falls back to a lenient
//! `<loc>` scan before a document is skipped.

use std::collections::{HashSet, VecDeque};
use std::io::Read;
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use url::Url;

use crate::config::SITEMAP_LIMIT;
use crate::dispatch::{normalize_transport_error, Dispatchers};
use crate::error::PipelineResult;

/// One item in the instruction stream produced per sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapInstruction {
    /// Child sitemaps to walk
    Recurse { urls: Vec<String> },
    /// Page URLs for the caller
    Process { urls: Vec<String> },
}

static LENIENT_LOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").expect("hardcoded regex"));

fn looks_like_sitemap(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".xml.gz") || lower.contains("sitemap")
}

/// Strict parse of one sitemap document into instructions.
fn parse_sitemap_strict(xml: &str) -> Result<Vec<SitemapInstruction>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut recurse_urls = Vec::new();
    let mut process_urls = Vec::new();
    let mut in_sitemap_entry = false;
    let mut in_url_entry = false;
    let mut in_loc = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sitemap" => in_sitemap_entry = true,
                b"url" => in_url_entry = true,
                b"loc" => in_loc = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"sitemap" => in_sitemap_entry = false,
                b"url" => in_url_entry = false,
                b"loc" => in_loc = false,
                _ => {}
            },
            Event::Text(t) => {
                if in_loc {
                    let loc = t
                        .unescape()
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).trim().to_string());
                    if loc.is_empty() {
                        continue;
                    }
                    if in_sitemap_entry {
                        recurse_urls.push(loc);
                    } else if in_url_entry {
                        process_urls.push(loc);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut instructions = Vec::new();
    if !recurse_urls.is_empty() {
        instructions.push(SitemapInstruction::Recurse { urls: recurse_urls });
    }
    if !process_urls.is_empty() {
        instructions.push(SitemapInstruction::Process { urls: process_urls });
    }
    Ok(instructions)
}

/// Lenient fallback: scan for `<loc>` entries and classify each by
/// shape.
fn parse_sitemap_lenient(xml: &str) -> Vec<SitemapInstruction> {
    let mut recurse_urls = Vec::new();
    let mut process_urls = Vec::new();
    for captures in LENIENT_LOC.captures_iter(xml) {
        let loc = captures[1].trim().to_string();
        if loc.is_empty() {
            continue;
        }
        if looks_like_sitemap(&loc) {
            recurse_urls.push(loc);
        } else {
            process_urls.push(loc);
        }
    }
    let mut instructions = Vec::new();
    if !recurse_urls.is_empty() {
        instructions.push(SitemapInstruction::Recurse { urls: recurse_urls });
    }
    if !process_urls.is_empty() {
        instructions.push(SitemapInstruction::Process { urls: process_urls });
    }
    instructions
}

/// Parse one sitemap document, strictly first, leniently on failure.
/// Returns an empty stream for documents with no usable locations.
#[must_use]
pub fn parse_sitemap(xml: &str) -> Vec<SitemapInstruction> {
    match parse_sitemap_strict(xml) {
        Ok(instructions) if !instructions.is_empty() => instructions,
        Ok(_) => parse_sitemap_lenient(xml),
        Err(e) => {
            tracing::debug!(error = %e, "strict sitemap parse failed; trying lenient scan");
            parse_sitemap_lenient(xml)
        }
    }
}

async fn fetch_sitemap_body(dispatchers: &Dispatchers, url: &Url) -> PipelineResult<String> {
    dispatchers.guard(url).await?;
    let response = dispatchers
        .client(false, false)
        .get(url.clone())
        .send()
        .await
        .map_err(|e| normalize_transport_error(&e, url.as_str()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(crate::error::EngineError::Fetch(format!(
            "sitemap fetch returned {status}"
        )));
    }

    if url.path().to_ascii_lowercase().ends_with(".gz") {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| normalize_transport_error(&e, url.as_str()))?;
        let mut decoder = GzDecoder::new(bytes.as_ref());
        let mut inflated = String::new();
        decoder
            .read_to_string(&mut inflated)
            .map_err(|e| crate::error::EngineError::Fetch(format!("gunzip failed: {e}")))?;
        Ok(inflated)
    } else {
        response
            .text()
            .await
            .map_err(|e| normalize_transport_error(&e, url.as_str()))
    }
}

/// Walk the sitemap graph rooted at `root_url`, invoking `on_urls`
/// for every batch of page URLs discovered. Returns the number of
/// page URLs emitted. The walk visits each sitemap at most once and
/// stops when `SITEMAP_LIMIT` URLs have been collected.
pub async fn walk_sitemaps<F>(
    dispatchers: &Dispatchers,
    root_url: &str,
    mut on_urls: F,
) -> PipelineResult<usize>
where
    F: FnMut(Vec<String>),
{
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut emitted = 0usize;
    queue.push_back(root_url.to_string());

    while let Some(sitemap_url) = queue.pop_front() {
        if emitted >= SITEMAP_LIMIT {
            break;
        }
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }
        let parsed = match Url::parse(&sitemap_url) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        let body = match fetch_sitemap_body(dispatchers, &parsed).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(url = %sitemap_url, error = %e, "sitemap fetch failed; skipping");
                continue;
            }
        };

        let instructions = parse_sitemap(&body);
        if instructions.is_empty() {
            tracing::warn!(url = %sitemap_url, "sitemap yielded no locations; skipping");
            continue;
        }
        for instruction in instructions {
            match instruction {
                SitemapInstruction::Recurse { urls } => {
                    for child in urls {
                        if !visited.contains(&child) {
                            queue.push_back(child);
                        }
                    }
                }
                SitemapInstruction::Process { mut urls } => {
                    let budget = SITEMAP_LIMIT - emitted;
                    urls.truncate(budget);
                    emitted += urls.len();
                    if !urls.is_empty() {
                        on_urls(urls);
                    }
                }
            }
        }
    }

    Ok(emitted)
}
