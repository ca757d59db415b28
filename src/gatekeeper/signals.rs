//! Quality signal computation for the gatekeeper
//!
//! Derives the measurable facts about a fetched HTML response that
//! rules and thresholds are evaluated against: byte size, visible
//! text length, main-content length, structured-data presence and
//! the page title.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

static SKIP_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script, style, noscript").expect("hardcoded selector")
});

static MAIN_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main, article, [role='main']").expect("hardcoded selector"));

static JSON_LD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("hardcoded selector")
});

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("hardcoded selector"));

/// Measured facts about one HTML response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityRecord {
    pub html_bytes: usize,
    pub visible_text_chars: usize,
    pub main_content_chars: usize,
    pub has_structured_data: bool,
}

/// Collapse all whitespace runs into single spaces.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

fn text_excluding_skipped(document: &Html, scope: Option<&Selector>) -> String {
    // Collect text from the chosen scope, skipping script/style/
    // noscript subtrees by id comparison.
    let skip_ids: std::collections::HashSet<_> = document
        .select(&SKIP_SELECTOR)
        .flat_map(|el| {
            el.descendants()
                .map(|n| n.id())
                .collect::<Vec<_>>()
        })
        .collect();

    let mut buffer = String::new();
    let roots: Vec<scraper::ElementRef> = match scope {
        Some(selector) => document.select(selector).collect(),
        None => vec![document.root_element()],
    };

    for root in roots {
        for node in root.descendants() {
            if skip_ids.contains(&node.id()) {
                continue;
            }
            if let Some(text) = node.value().as_text() {
                buffer.push_str(text);
                buffer.push(' ');
            }
        }
    }
    collapse_whitespace(&buffer)
}

/// The page's visible text: HTML with script/style/noscript removed,
/// tags stripped, whitespace collapsed.
#[must_use]
pub fn visible_text(document: &Html) -> String {
    text_excluding_skipped(document, None)
}

/// Same cleaning restricted to main/article containers, falling back
/// to the full visible text when none exist.
#[must_use]
pub fn main_content_text(document: &Html) -> String {
    let scoped = text_excluding_skipped(document, Some(&MAIN_SELECTOR));
    if scoped.is_empty() && document.select(&MAIN_SELECTOR).next().is_none() {
        visible_text(document)
    } else {
        scoped
    }
}

#[must_use]
pub fn has_structured_data(document: &Html) -> bool {
    document.select(&JSON_LD_SELECTOR).next().is_some()
}

#[must_use]
pub fn page_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Compute every quality signal for one response in a single parse.
#[must_use]
pub fn measure(html: &str) -> (QualityRecord, Option<String>, String) {
    let document = Html::parse_document(html);
    let visible = visible_text(&document);
    let main = main_content_text(&document);
    let quality = QualityRecord {
        html_bytes: html.len(),
        visible_text_chars: visible.chars().count(),
        main_content_chars: main.chars().count(),
        has_structured_data: has_structured_data(&document),
    };
    let title = page_title(&document);
    (quality, title, visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_text_skips_scripts_and_collapses_whitespace() {
        let html = r"<html><body>
            <script>var x = 'invisible';</script>
            <p>Hello   world</p>
            <style>.a { color: red }</style>
        </body></html>";
        let document = Html::parse_document(html);
        assert_eq!(visible_text(&document), "Hello world");
    }

    #[test]
    fn main_content_prefers_article() {
        let html = r"<html><body>
            <nav>Menu Menu Menu</nav>
            <article>Only this counts</article>
        </body></html>";
        let document = Html::parse_document(html);
        assert_eq!(main_content_text(&document), "Only this counts");
    }

    #[test]
    fn main_content_falls_back_to_full_text() {
        let html = "<html><body><div>No containers here</div></body></html>";
        let document = Html::parse_document(html);
        assert_eq!(main_content_text(&document), "No containers here");
    }

    #[test]
    fn structured_data_detection() {
        let with = r#"<html><head><script type="application/ld+json">{}</script></head></html>"#;
        let without = "<html><head><script>{}</script></head></html>";
        assert!(has_structured_data(&Html::parse_document(with)));
        assert!(!has_structured_data(&Html::parse_document(without)));
    }

    #[test]
    fn measure_is_deterministic() {
        let html = "<html><head><title>T</title></head><body><p>body text</p></body></html>";
        let (q1, t1, v1) = measure(html);
        let (q2, t2, v2) = measure(html);
        assert_eq!(q1, q2);
        assert_eq!(t1, t2);
        assert_eq!(v1, v2);
        assert_eq!(t1.as_deref(), Some("T"));
    }
}
