//! Domain blocklist
//!
//! Initialized once at startup from the built-in blob (empty by
//! default) plus any operator-supplied roots. A hit matches the exact
//! domain, any subdomain of a blocked root, or the same base name
//! under a different TLD. Team-level allowed domains are exempt.

use std::collections::HashSet;

use url::Url;

/// The built-in blocked-domain blob. Ships empty; deployments append
/// their own roots.
const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[];

#[derive(Debug, Default)]
pub struct Blocklist {
    roots: Vec<String>,
    base_names: HashSet<String>,
    allowed: HashSet<String>,
}

/// The label ahead of the TLD: `shop.example.co` -> `example`.
fn base_name(host: &str) -> Option<&str> {
    let mut labels = host.rsplit('.');
    let _tld = labels.next()?;
    labels.next()
}

impl Blocklist {
    /// Build from the default blob plus operator exemptions.
    #[must_use]
    pub fn new(allowed_domains: &[String]) -> Self {
        Self::with_domains(
            DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()),
            allowed_domains,
        )
    }

    #[must_use]
    pub fn with_domains(
        blocked: impl IntoIterator<Item = String>,
        allowed_domains: &[String],
    ) -> Self {
        let roots: Vec<String> = blocked
            .into_iter()
            .map(|d| d.trim().trim_start_matches("www.").to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        let base_names = roots
            .iter()
            .filter_map(|root| base_name(root).map(str::to_string))
            .collect();
        Self {
            roots,
            base_names,
            allowed: allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_blocked(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_start_matches("www.").to_ascii_lowercase();

        if self.allowed.contains(&host) {
            return false;
        }

        for root in &self.roots {
            if host == *root || host.ends_with(&format!(".{root}")) {
                return true;
            }
        }

        // Same base name, different TLD.
        if let Some(base) = base_name(&host) {
            if self.base_names.contains(base) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn blocklist(blocked: &[&str], allowed: &[&str]) -> Blocklist {
        Blocklist::with_domains(
            blocked.iter().map(|d| d.to_string()),
            &allowed.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        )
    }

    #[test]
    fn default_blob_blocks_nothing() {
        let list = Blocklist::new(&[]);
        assert!(!list.is_blocked(&url("https://anything.example.com/")));
    }

    #[test]
    fn exact_and_subdomain_match() {
        let list = blocklist(&["blocked.com"], &[]);
        assert!(list.is_blocked(&url("https://blocked.com/")));
        assert!(list.is_blocked(&url("https://www.blocked.com/")));
        assert!(list.is_blocked(&url("https://cdn.blocked.com/x")));
        assert!(!list.is_blocked(&url("https://notblocked.com/")));
    }

    #[test]
    fn different_tld_variant_matches() {
        let list = blocklist(&["blocked.com"], &[]);
        assert!(list.is_blocked(&url("https://blocked.org/")));
        assert!(list.is_blocked(&url("https://blocked.io/")));
    }

    #[test]
    fn allowed_domains_are_exempt() {
        let list = blocklist(&["blocked.com"], &["blocked.com"]);
        assert!(!list.is_blocked(&url("https://blocked.com/")));
    }
}
