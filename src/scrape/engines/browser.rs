//! Rendering-microservice engine
//!
//! Delegates JavaScript-dependent pages to the configured headless
//! rendering service over a small JSON protocol. Challenge responses
//! (401/403 or a Set-Cookie on the reply) are retried on the same
//! engine under an explicit policy, switching to stealth mode for the
//! retries; observed challenge flows often pass on the second hit
//! once cookies are established.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dispatch::normalize_transport_error;
use crate::error::EngineError;
use crate::scrape::document::{ProxyTag, RenderStatus};
use crate::scrape::meta::Meta;
use crate::scrape::options::DEFAULT_TIMEOUT_MS;

use super::{Engine, EngineDeps, EngineKind, EngineOutcome, EngineResult};

/// Same-engine retry policy for challenge responses
#[derive(Debug, Clone)]
pub struct ChallengeRetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    /// Page status codes that trigger a retry
    pub retry_statuses: Vec<u16>,
}

impl Default for ChallengeRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_statuses: vec![401, 403],
        }
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    wait_after_load: u64,
    timeout: u64,
    headers: &'a HashMap<String, String>,
    skip_tls_verification: bool,
    use_stealth: bool,
}

#[derive(Deserialize)]
struct RenderResponse {
    content: Option<String>,
    #[serde(rename = "pageStatusCode")]
    page_status_code: Option<u16>,
    #[serde(rename = "contentType")]
    content_type: Option<String>,
    render_status: Option<RenderStatus>,
    evidence: Option<serde_json::Value>,
    #[serde(rename = "pageError")]
    page_error: Option<String>,
}

pub struct BrowserEngine<'a> {
    pub deps: EngineDeps<'a>,
    pub policy: ChallengeRetryPolicy,
}

impl<'a> BrowserEngine<'a> {
    #[must_use]
    pub fn new(deps: EngineDeps<'a>) -> Self {
        Self {
            deps,
            policy: ChallengeRetryPolicy::default(),
        }
    }

    async fn attempt(&self, meta: &Meta, service_url: &str, use_stealth: bool) -> AttemptResult {
        let timeout = meta
            .abort
            .remaining_ms()
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .max(1);
        let payload = RenderRequest {
            url: meta.url.as_str(),
            wait_after_load: meta.options.wait_for_ms(),
            timeout,
            headers: &meta.options.headers,
            skip_tls_verification: meta.options.skip_tls(),
            use_stealth,
        };

        let client = self.deps.dispatchers.client(false, false);
        let response = match client.post(service_url).json(&payload).send().await {
            Ok(response) => response,
            Err(err) => {
                return AttemptResult::Failed(normalize_transport_error(&err, service_url));
            }
        };

        let set_cookie = response
            .headers()
            .contains_key(reqwest::header::SET_COOKIE);

        let body: RenderResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                return AttemptResult::Failed(EngineError::Fetch(format!(
                    "rendering service returned malformed JSON: {err}"
                )));
            }
        };

        let status = body.page_status_code.unwrap_or(200);
        if let Some(error) = &body.page_error {
            tracing::debug!(url = %meta.url, error = %error, "rendering service reported page error");
        }

        let content = body.content.unwrap_or_default();
        if content.trim().is_empty() && body.page_error.is_some() {
            return AttemptResult::Empty;
        }

        AttemptResult::Rendered {
            result: EngineResult {
                final_url: meta.url.to_string(),
                html: content,
                status_code: status,
                content_type: body.content_type,
                proxy_used: if use_stealth {
                    ProxyTag::Stealth
                } else {
                    ProxyTag::Basic
                },
                render_status: body.render_status,
                pdf_metadata: None,
                markdown: None,
                upstream_evidence: body.evidence,
                set_cookie,
            },
            set_cookie,
        }
    }
}

enum AttemptResult {
    Rendered { result: EngineResult, set_cookie: bool },
    Empty,
    Failed(EngineError),
}

#[async_trait]
impl Engine for BrowserEngine<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Browser
    }

    async fn run(&self, meta: &Meta) -> EngineOutcome {
        let Some(service_url) = self.deps.config.browser_service_url.as_deref() else {
            return EngineOutcome::Transport(EngineError::Internal(
                "browser engine invoked without a configured rendering service".to_string(),
            ));
        };

        if let Err(err) = self.deps.dispatchers.guard(&meta.url).await {
            return EngineOutcome::Transport(err);
        }

        let mut last: Option<EngineResult> = None;
        for attempt in 0..=self.policy.max_retries {
            let use_stealth = attempt > 0;
            match self.attempt(meta, service_url, use_stealth).await {
                AttemptResult::Failed(err) => return EngineOutcome::Transport(err),
                AttemptResult::Empty => return EngineOutcome::Unsuccessful,
                AttemptResult::Rendered { result, set_cookie } => {
                    let challenged = self.policy.retry_statuses.contains(&result.status_code)
                        || set_cookie;
                    last = Some(result);
                    if !challenged {
                        break;
                    }
                    if attempt < self.policy.max_retries {
                        tracing::debug!(url = %meta.url, attempt,
                            "challenge response from renderer; retrying same engine");
                    }
                }
            }
        }

        match last {
            Some(result) => EngineOutcome::Ok(result),
            None => EngineOutcome::Unsuccessful,
        }
    }
}
