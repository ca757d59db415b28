//! robots.txt evaluation
//!
//! Fetches `<scheme>://<host>/robots.txt` through the outbound
//! fabric, caches the body per host, and answers allowance queries
//! for a caller-supplied list of user-agent tokens. Unreachable or
//! missing robots files allow everything.

use dashmap::DashMap;
use texting_robots::Robot;
use url::Url;

use crate::dispatch::{normalize_transport_error, Dispatchers};

/// User-agent tokens checked, in order, when no caller list is given.
pub const DEFAULT_AGENT_TOKENS: &[&str] = &["pagemill", "*"];

/// Per-host robots.txt cache plus evaluation
#[derive(Default)]
pub struct RobotsEvaluator {
    /// host key -> robots body; `None` records an unreachable file so
    /// repeat fetches are skipped.
    cache: DashMap<String, Option<String>>,
}

impl RobotsEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn host_key(url: &Url) -> Option<String> {
        let host = url.host_str()?;
        match url.port() {
            Some(port) => Some(format!("{}://{host}:{port}", url.scheme())),
            None => Some(format!("{}://{host}", url.scheme())),
        }
    }

    async fn robots_body(&self, dispatchers: &Dispatchers, url: &Url) -> Option<String> {
        let key = Self::host_key(url)?;
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let robots_url = match Url::parse(&format!("{key}/robots.txt")) {
            Ok(robots_url) => robots_url,
            Err(_) => return None,
        };

        let body = match self.fetch_robots(dispatchers, &robots_url).await {
            Ok(body) => body,
            Err(message) => {
                tracing::warn!(url = %robots_url, error = %message,
                    "robots.txt unavailable; allowing all");
                None
            }
        };
        self.cache.insert(key, body.clone());
        body
    }

    async fn fetch_robots(
        &self,
        dispatchers: &Dispatchers,
        robots_url: &Url,
    ) -> Result<Option<String>, String> {
        dispatchers
            .guard(robots_url)
            .await
            .map_err(|e| e.to_string())?;
        let response = dispatchers
            .client(false, false)
            .get(robots_url.clone())
            .send()
            .await
            .map_err(|e| normalize_transport_error(&e, robots_url.as_str()).to_string())?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(Some(body))
    }

    /// Whether any of the user-agent tokens is allowed to fetch `url`.
    /// If the URL does not end in `/`, an explicit disallow on the
    /// trailing-slash form also blocks it.
    pub async fn is_allowed(
        &self,
        dispatchers: &Dispatchers,
        url: &Url,
        agent_tokens: &[&str],
    ) -> bool {
        let Some(body) = self.robots_body(dispatchers, url).await else {
            return true;
        };

        let allowed = allowed_by_any_agent(&body, agent_tokens, url.as_str());
        if !allowed {
            return false;
        }
        if !url.path().ends_with('/') {
            let slash_form = format!("{url}/");
            if !allowed_by_any_agent(&body, agent_tokens, &slash_form) {
                return false;
            }
        }
        true
    }

    /// Seed the cache directly; used by tests and the crawler's
    /// sitemap warm-up.
    pub fn seed(&self, scheme_host: &str, body: Option<String>) {
        self.cache.insert(scheme_host.to_string(), body);
    }
}

fn allowed_by_any_agent(body: &str, agent_tokens: &[&str], url: &str) -> bool {
    let tokens: &[&str] = if agent_tokens.is_empty() {
        DEFAULT_AGENT_TOKENS
    } else {
        agent_tokens
    };
    tokens.iter().any(|token| {
        // An unparsable robots file yields allow, mirroring the
        // missing-file behavior.
        Robot::new(token, body.as_bytes())
            .map(|robot| robot.allowed(url))
            .unwrap_or(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_token_allowing_wins() {
        let body = "User-agent: badbot\nDisallow: /\n\nUser-agent: *\nAllow: /";
        assert!(allowed_by_any_agent(
            body,
            &["badbot", "goodbot"],
            "https://example.com/page"
        ));
    }

    #[test]
    fn disallow_applies_to_matching_agent() {
        let body = "User-agent: *\nDisallow: /private";
        assert!(!allowed_by_any_agent(
            body,
            &["anybot"],
            "https://example.com/private/data"
        ));
        assert!(allowed_by_any_agent(
            body,
            &["anybot"],
            "https://example.com/public"
        ));
    }

    #[tokio::test]
    async fn seeded_disallow_blocks_trailing_slash_form() {
        let evaluator = RobotsEvaluator::new();
        evaluator.seed(
            "https://example.com",
            Some("User-agent: *\nDisallow: /private/".to_string()),
        );
        let dispatchers = Dispatchers::new(&crate::config::AppConfig::default()).unwrap();
        let url = Url::parse("https://example.com/private").unwrap();
        // "/private" itself is not matched by "Disallow: /private/",
        // but the trailing-slash recheck blocks it.
        assert!(!evaluator.is_allowed(&dispatchers, &url, &["bot"]).await);
    }

    #[tokio::test]
    async fn seeded_missing_robots_allows_all() {
        let evaluator = RobotsEvaluator::new();
        evaluator.seed("https://example.com", None);
        let dispatchers = Dispatchers::new(&crate::config::AppConfig::default()).unwrap();
        let url = Url::parse("https://example.com/anything").unwrap();
        assert!(evaluator.is_allowed(&dispatchers, &url, &["bot"]).await);
    }
}
