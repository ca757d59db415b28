//! Direct HTTP acquisition engine
//!
//! Issues a single GET with redirects followed, consults a
//! process-wide conditional-GET cache, decodes the body honoring any
//! `<meta charset>` hint, and hands the response headers to the
//! specialty sniffer before returning.

use std::sync::LazyLock;

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;

use crate::dispatch::{header_map, normalize_transport_error};
use crate::scrape::document::ProxyTag;
use crate::scrape::meta::Meta;
use crate::scrape::sniffer;

use super::{Engine, EngineDeps, EngineKind, EngineOutcome, EngineResult};

/// Validators plus the body they validate, for 304 replay.
#[derive(Debug, Clone)]
struct CachedResponse {
    etag: Option<String>,
    last_modified: Option<String>,
    body: String,
    status: u16,
    content_type: Option<String>,
}

/// Process-wide conditional-GET cache, keyed by URL. Last writer
/// wins; entries are validators plus a body.
#[derive(Default)]
pub struct ValidatorCache {
    entries: DashMap<String, CachedResponse>,
}

impl ValidatorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9_\-]+)"#).expect("hardcoded regex")
});

/// Decode response bytes as UTF-8, then rescan the first page for a
/// `<meta charset>` hint and re-decode if it names a different,
/// known charset.
#[must_use]
pub fn decode_body(bytes: &[u8]) -> String {
    let utf8 = String::from_utf8_lossy(bytes);
    let mut head_len = utf8.len().min(1024);
    while !utf8.is_char_boundary(head_len) {
        head_len -= 1;
    }
    let head = &utf8[..head_len];
    if let Some(captures) = META_CHARSET.captures(head) {
        let label = &captures[1];
        if !label.eq_ignore_ascii_case("utf-8") && !label.eq_ignore_ascii_case("utf8") {
            if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
                let (decoded, _, had_errors) = encoding.decode(bytes);
                if !had_errors {
                    return decoded.into_owned();
                }
            }
        }
    }
    utf8.into_owned()
}

fn caller_sent_conditional(meta: &Meta) -> bool {
    meta.options
        .headers
        .keys()
        .any(|k| k.eq_ignore_ascii_case("if-none-match") || k.eq_ignore_ascii_case("if-modified-since"))
}

pub struct FetchEngine<'a> {
    pub deps: EngineDeps<'a>,
}

#[async_trait]
impl Engine for FetchEngine<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Fetch
    }

    async fn run(&self, meta: &Meta) -> EngineOutcome {
        if let Err(err) = self.deps.dispatchers.guard(&meta.url).await {
            return EngineOutcome::Transport(err);
        }

        let client = self.deps.dispatchers.client(meta.options.skip_tls(), false);
        let mut request = client
            .get(meta.url.clone())
            .headers(header_map(&meta.options.headers));

        // Clone out of the map so no shard lock is held across the
        // request await.
        let cached: Option<CachedResponse> = self
            .deps
            .validator_cache
            .entries
            .get(meta.url.as_str())
            .map(|entry| entry.clone());
        if let Some(cached) = &cached {
            if !caller_sent_conditional(meta) {
                if let Some(etag) = &cached.etag {
                    request = request.header(IF_NONE_MATCH, etag.as_str());
                }
                if let Some(last_modified) = &cached.last_modified {
                    request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
                }
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return EngineOutcome::Transport(normalize_transport_error(
                    &err,
                    meta.url.as_str(),
                ));
            }
        };

        let final_url = response.url().to_string();
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status == StatusCode::NOT_MODIFIED {
            if let Some(cached) = cached {
                tracing::debug!(url = %meta.url, "304 revalidated; serving cached body");
                return EngineOutcome::Ok(EngineResult {
                    final_url,
                    html: cached.body.clone(),
                    status_code: cached.status,
                    content_type: cached.content_type.clone(),
                    proxy_used: ProxyTag::Basic,
                    render_status: None,
                    pdf_metadata: None,
                    markdown: None,
                    upstream_evidence: None,
                    set_cookie: false,
                });
            }
        }

        // A specialty content type aborts this engine in favor of the
        // PDF/document path, unless that flag is already active.
        let verdict = sniffer::sniff_content_type(content_type.as_deref());
        if let Some(flags) = verdict.escalation() {
            let already = (flags.pdf && meta.features.pdf)
                || (flags.document && meta.features.document);
            if !already {
                tracing::debug!(url = %meta.url, content_type = ?content_type,
                    "content-type escalation from fetch engine");
                return EngineOutcome::Escalate(flags);
            }
        }

        let set_cookie = response
            .headers()
            .contains_key(reqwest::header::SET_COOKIE);

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return EngineOutcome::Transport(normalize_transport_error(
                    &err,
                    meta.url.as_str(),
                ));
            }
        };
        let body = decode_body(&bytes);

        if status.is_success() && (etag.is_some() || last_modified.is_some()) {
            self.deps.validator_cache.entries.insert(
                meta.url.to_string(),
                CachedResponse {
                    etag,
                    last_modified,
                    body: body.clone(),
                    status: status.as_u16(),
                    content_type: content_type.clone(),
                },
            );
        }

        EngineOutcome::Ok(EngineResult {
            final_url,
            html: body,
            status_code: status.as_u16(),
            content_type,
            proxy_used: ProxyTag::Basic,
            render_status: None,
            pdf_metadata: None,
            markdown: None,
            upstream_evidence: None,
            set_cookie,
        })
    }
}
