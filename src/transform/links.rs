//! Link and image extraction
//!
//! Returns the ordered set of distinct absolute URLs from anchors and
//! image sources, resolved against the final URL. Deduplication
//! preserves first-seen document order.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("hardcoded selector"));

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("hardcoded selector"));

fn resolve(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let resolved = base.join(raw).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Distinct absolute href values from `<a>`, in document order.
#[must_use]
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(resolved) = resolve(base, href) {
            if seen.insert(resolved.clone()) {
                links.push(resolved);
            }
        }
    }
    links
}

/// Distinct absolute `src` values from `<img>`, omitting `data:` URLs
/// when `remove_base64` is set.
#[must_use]
pub fn extract_images(html: &str, base: &Url, remove_base64: bool) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for element in document.select(&IMG_SELECTOR) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        if src.trim_start().starts_with("data:") {
            if remove_base64 {
                continue;
            }
            // Non-HTTP data URL cannot be resolved; carry it verbatim.
            if seen.insert(src.to_string()) {
                images.push(src.to_string());
            }
            continue;
        }
        if let Some(resolved) = resolve(base, src) {
            if seen.insert(resolved.clone()) {
                images.push(resolved);
            }
        }
    }
    images
}
