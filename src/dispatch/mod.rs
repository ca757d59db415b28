//! Outbound request fabric
//!
//! Four long-lived `reqwest` clients indexed by `{skip_tls,
//! allow_cookies}` multiplex every outbound connection the service
//! makes: fetch engine, browser microservice, robots, sitemaps and
//! file downloads. The fabric enforces the egress guard before a
//! request is issued, tunnels through the configured proxy, and
//! normalizes transport failures into the pipeline error taxonomy.

pub mod ssrf;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, Proxy};
use url::Url;

use crate::config::{AppConfig, ProxyConfig};
use crate::error::{EngineError, PipelineResult};

pub use ssrf::{ensure_public_host, is_public_ip};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: usize = 10;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/132.0.0.0 Safari/537.36";

/// The four outbound clients plus the egress policy they share.
#[derive(Debug)]
pub struct Dispatchers {
    clients: [Client; 4],
    allow_local: bool,
}

fn build_client(
    skip_tls: bool,
    allow_cookies: bool,
    proxy: Option<&ProxyConfig>,
) -> PipelineResult<Client> {
    let mut builder = Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(skip_tls)
        .cookie_store(allow_cookies);

    if let Some(proxy_config) = proxy {
        let mut proxy = Proxy::all(&proxy_config.server)
            .map_err(|e| EngineError::ProxySelection(e.to_string()))?;
        if let (Some(user), Some(pass)) = (
            proxy_config.username.as_deref(),
            proxy_config.password.as_deref(),
        ) {
            proxy = proxy.basic_auth(user, pass);
        }
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| EngineError::Internal(format!("client build failed: {e}")))
}

const fn client_index(skip_tls: bool, allow_cookies: bool) -> usize {
    (skip_tls as usize) << 1 | allow_cookies as usize
}

impl Dispatchers {
    pub fn new(config: &AppConfig) -> PipelineResult<Self> {
        let proxy = config.proxy.as_ref();
        Ok(Self {
            clients: [
                build_client(false, false, proxy)?,
                build_client(false, true, proxy)?,
                build_client(true, false, proxy)?,
                build_client(true, true, proxy)?,
            ],
            allow_local: config.allow_local_webhooks,
        })
    }

    #[must_use]
    pub fn client(&self, skip_tls: bool, allow_cookies: bool) -> &Client {
        &self.clients[client_index(skip_tls, allow_cookies)]
    }

    /// Egress guard applied before any request leaves the process.
    pub async fn guard(&self, url: &Url) -> PipelineResult<()> {
        ensure_public_host(url, self.allow_local).await
    }
}

/// Map a `reqwest` failure onto the pipeline taxonomy. Certificate
/// problems become `Ssl`, resolution failures become `DnsResolution`,
/// everything else stays a transport `Fetch` error.
#[must_use]
pub fn normalize_transport_error(err: &reqwest::Error, url: &str) -> EngineError {
    let detail = format!("{err:?}").to_ascii_lowercase();
    if detail.contains("certificate") || detail.contains("handshake") || detail.contains("tls") {
        return EngineError::Ssl(err.to_string());
    }
    if detail.contains("dns") || detail.contains("lookup") {
        return EngineError::DnsResolution(url.to_string());
    }
    if err.is_timeout() {
        return EngineError::Fetch(format!("request to {url} timed out"));
    }
    EngineError::Fetch(err.to_string())
}

/// Build a `HeaderMap` from caller-supplied header pairs, dropping
/// anything that is not a valid header name/value.
#[must_use]
pub fn header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(header = %name, "dropping invalid header name");
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            tracing::warn!(header = %name, "dropping invalid header value");
            continue;
        };
        map.insert(name, value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_index_covers_all_combinations() {
        let mut seen = [false; 4];
        for skip_tls in [false, true] {
            for allow_cookies in [false, true] {
                seen[client_index(skip_tls, allow_cookies)] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn dispatchers_build_without_proxy() {
        let config = AppConfig::default();
        assert!(Dispatchers::new(&config).is_ok());
    }

    #[test]
    fn invalid_proxy_uri_is_a_proxy_selection_error() {
        let config = AppConfig {
            proxy: Some(ProxyConfig {
                server: "::not a uri::".to_string(),
                username: None,
                password: None,
            }),
            ..AppConfig::default()
        };
        let err = Dispatchers::new(&config).unwrap_err();
        assert!(matches!(err, EngineError::ProxySelection(_)));
    }

    #[test]
    fn header_map_drops_invalid_names() {
        let mut headers = HashMap::new();
        headers.insert("X-Good".to_string(), "1".to_string());
        headers.insert("bad header".to_string(), "1".to_string());
        let map = header_map(&headers);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("x-good"));
    }
}
