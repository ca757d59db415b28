//! Page metadata extraction
//!
//! Pulls title, description, language, canonical link, Open Graph
//! fields and favicon out of a page head.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse($css).expect("hardcoded selector"));
    };
}

selector!(TITLE, "title");
selector!(DESCRIPTION, r#"meta[name="description"]"#);
selector!(HTML_TAG, "html");
selector!(CANONICAL, r#"link[rel="canonical"]"#);
selector!(OG_TITLE, r#"meta[property="og:title"]"#);
selector!(OG_DESCRIPTION, r#"meta[property="og:description"]"#);
selector!(OG_IMAGE, r#"meta[property="og:image"]"#);
selector!(FAVICON, r#"link[rel="icon"], link[rel="shortcut icon"]"#);

/// Metadata extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub canonical_url: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub favicon: Option<String>,
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn link_href(document: &Html, selector: &Selector, base: &Url) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
}

/// Extract page metadata, resolving link targets against the final
/// URL.
#[must_use]
pub fn extract_metadata(html: &str, base: &Url) -> PageMetadata {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>())
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let language = document
        .select(&HTML_TAG)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    PageMetadata {
        title,
        description: meta_content(&document, &DESCRIPTION),
        language,
        canonical_url: link_href(&document, &CANONICAL, base),
        og_title: meta_content(&document, &OG_TITLE),
        og_description: meta_content(&document, &OG_DESCRIPTION),
        og_image: meta_content(&document, &OG_IMAGE),
        favicon: link_href(&document, &FAVICON, base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_head_fields() {
        let html = r#"<html lang="en">
            <head>
                <title> The   Title </title>
                <meta name="description" content="A page.">
                <link rel="canonical" href="/canonical">
                <meta property="og:title" content="OG Title">
                <link rel="icon" href="/favicon.ico">
            </head>
            <body></body>
        </html>"#;
        let base = Url::parse("https://example.com/deep/page").unwrap();
        let meta = extract_metadata(html, &base);
        assert_eq!(meta.title.as_deref(), Some("The Title"));
        assert_eq!(meta.description.as_deref(), Some("A page."));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(
            meta.canonical_url.as_deref(),
            Some("https://example.com/canonical")
        );
        assert_eq!(meta.og_title.as_deref(), Some("OG Title"));
        assert_eq!(
            meta.favicon.as_deref(),
            Some("https://example.com/favicon.ico")
        );
    }

    #[test]
    fn missing_fields_stay_none() {
        let base = Url::parse("https://example.com/").unwrap();
        let meta = extract_metadata("<html><body>bare</body></html>", &base);
        assert_eq!(meta, PageMetadata::default());
    }
}
