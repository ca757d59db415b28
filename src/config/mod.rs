//! Service configuration
//!
//! Environment-driven configuration loaded once at startup. Every
//! knob has a default suitable for a local deployment so the service
//! boots with no environment at all.

use std::path::PathBuf;

/// Default thresholds applied by the gatekeeper when neither the
/// environment nor the rules file overrides them.
pub const DEFAULT_MIN_HTML_BYTES: usize = 2048;
pub const DEFAULT_MIN_VISIBLE_TEXT_CHARS: usize = 600;
pub const DEFAULT_MIN_MAIN_CONTENT_CHARS: usize = 400;

/// Upper bound on URLs collected across an entire sitemap walk.
pub const SITEMAP_LIMIT: usize = 20_000;

/// Parse budget assumed per PDF page when checking the remaining
/// scrape budget.
pub const PDF_MS_PER_PAGE: u64 = 150;

/// Proxy endpoint with optional basic credentials
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Main service configuration, assembled from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub logging_level: String,
    pub proxy: Option<ProxyConfig>,
    /// Permit egress into loopback/private ranges. Off by default;
    /// only local development should enable it.
    pub allow_local_webhooks: bool,
    /// Base URL of the headless-rendering microservice. When unset
    /// the browser engine is excluded from every engine list.
    pub browser_service_url: Option<String>,
    pub expose_error_details: bool,
    pub expose_error_stack: bool,
    pub gatekeeper_rules_path: Option<PathBuf>,
    pub min_html_bytes: usize,
    pub min_visible_text_chars: usize,
    pub min_main_content_chars: usize,
    /// Evaluate robots.txt before every scrape (crawls always do).
    pub check_robots_on_scrape: bool,
    /// Domains exempted from the blocklist.
    pub blocklist_allowed_domains: Vec<String>,
    /// Worker pool size for crawl page processing.
    pub crawl_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3002,
            logging_level: "info".to_string(),
            proxy: None,
            allow_local_webhooks: false,
            browser_service_url: None,
            expose_error_details: false,
            expose_error_stack: false,
            gatekeeper_rules_path: None,
            min_html_bytes: DEFAULT_MIN_HTML_BYTES,
            min_visible_text_chars: DEFAULT_MIN_VISIBLE_TEXT_CHARS,
            min_main_content_chars: DEFAULT_MIN_MAIN_CONTENT_CHARS,
            check_robots_on_scrape: false,
            blocklist_allowed_domains: Vec::new(),
            crawl_concurrency: 10,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn env_usize(key: &str) -> Option<usize> {
    env_string(key).and_then(|v| v.parse().ok())
}

impl AppConfig {
    /// Assemble the configuration from process environment variables,
    /// falling back to defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let proxy = env_string("PROXY_SERVER").map(|server| ProxyConfig {
            server,
            username: env_string("PROXY_USERNAME"),
            password: env_string("PROXY_PASSWORD"),
        });

        Self {
            host: env_string("HOST").unwrap_or(defaults.host),
            port: env_string("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            logging_level: env_string("LOGGING_LEVEL").unwrap_or(defaults.logging_level),
            proxy,
            allow_local_webhooks: env_bool("ALLOW_LOCAL_WEBHOOKS")
                .unwrap_or(defaults.allow_local_webhooks),
            browser_service_url: env_string("PLAYWRIGHT_MICROSERVICE_URL"),
            expose_error_details: env_bool("EXPOSE_ERROR_DETAILS")
                .unwrap_or(defaults.expose_error_details),
            expose_error_stack: env_bool("EXPOSE_ERROR_STACK")
                .unwrap_or(defaults.expose_error_stack),
            gatekeeper_rules_path: env_string("GATEKEEPER_RULES_PATH").map(PathBuf::from),
            min_html_bytes: env_usize("MIN_HTML_BYTES").unwrap_or(defaults.min_html_bytes),
            min_visible_text_chars: env_usize("MIN_VISIBLE_TEXT_CHARS")
                .unwrap_or(defaults.min_visible_text_chars),
            min_main_content_chars: env_usize("MIN_MAIN_CONTENT_CHARS")
                .unwrap_or(defaults.min_main_content_chars),
            check_robots_on_scrape: env_bool("CHECK_ROBOTS_ON_SCRAPE")
                .unwrap_or(defaults.check_robots_on_scrape),
            blocklist_allowed_domains: env_string("BLOCKLIST_ALLOWED_DOMAINS")
                .map(|v| {
                    v.split(',')
                        .map(|d| d.trim().to_ascii_lowercase())
                        .filter(|d| !d.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            crawl_concurrency: env_usize("CRAWL_CONCURRENCY").unwrap_or(defaults.crawl_concurrency),
        }
    }
}
