//! HTML cleanup
//!
//! Removes script/style/noscript and boilerplate, honors the caller's
//! include/exclude tag lists, rewrites relative URLs against the
//! final URL, and strips base64 image data URIs. The rewrite pass
//! streams through `lol_html`; include-tag scoping and main-content
//! extraction select on the parsed DOM first.

use std::borrow::Cow;
use std::sync::LazyLock;

use anyhow::Result;
use lol_html::html_content::Element;
use lol_html::{ElementContentHandlers, HtmlRewriter, Selector, Settings};
use scraper::{Html, Selector as CssSelector};
use url::Url;

/// Containers tried in priority order for main-content extraction.
static MAIN_CONTENT_SELECTORS: LazyLock<Vec<CssSelector>> = LazyLock::new(|| {
    [
        "main",
        "article",
        "[role='main']",
        "#main-content",
        ".main-content",
        "#content",
        ".content",
        ".post-content",
        ".entry-content",
    ]
    .iter()
    .map(|s| CssSelector::parse(s).expect("hardcoded selector"))
    .collect()
});

static BODY_SELECTOR: LazyLock<CssSelector> =
    LazyLock::new(|| CssSelector::parse("body").expect("hardcoded selector"));

/// Boilerplate stripped in main-content mode.
const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "aside", "form"];

const ALWAYS_REMOVED: &[&str] = &["script", "style", "noscript"];

/// Options controlling one cleanup pass
pub struct CleanupOptions<'a> {
    pub base_url: &'a Url,
    pub only_main_content: bool,
    pub include_tags: &'a [String],
    pub exclude_tags: &'a [String],
    pub remove_base64_images: bool,
}

/// Extract the primary content container, falling back to `<body>`
/// and finally the whole input.
#[must_use]
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);
    for selector in MAIN_CONTENT_SELECTORS.iter() {
        if let Some(element) = document.select(selector).next() {
            return element.html();
        }
    }
    if let Some(body) = document.select(&BODY_SELECTOR).next() {
        return body.html();
    }
    html.to_string()
}

fn scope_to_include_tags(html: &str, include_tags: &[String]) -> String {
    let document = Html::parse_document(html);
    let mut fragments = Vec::new();
    for tag in include_tags {
        let Ok(selector) = CssSelector::parse(tag) else {
            tracing::warn!(selector = %tag, "skipping unparsable include selector");
            continue;
        };
        for element in document.select(&selector) {
            fragments.push(element.html());
        }
    }
    if fragments.is_empty() {
        String::new()
    } else {
        fragments.join("\n")
    }
}

fn removal_handler(selector: &str) -> Option<(Cow<'static, Selector>, ElementContentHandlers<'static>)> {
    let parsed: Selector = match selector.parse() {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(selector = %selector, error = %e, "skipping unparsable removal selector");
            return None;
        }
    };
    let handlers = ElementContentHandlers::default().element(|el: &mut Element| {
        el.remove();
        Ok(())
    });
    Some((Cow::Owned(parsed), handlers))
}

fn rewrite_attr_handler(
    selector: &str,
    attr: &'static str,
    base: Url,
    strip_base64: bool,
) -> (Cow<'static, Selector>, ElementContentHandlers<'static>) {
    let parsed: Selector = selector.parse().expect("hardcoded selector");
    let handlers = ElementContentHandlers::default().element(move |el: &mut Element| {
        let Some(value) = el.get_attribute(attr) else {
            return Ok(());
        };
        if value.starts_with("data:") {
            if strip_base64 && value.contains(";base64,") {
                el.remove_attribute(attr);
            }
            return Ok(());
        }
        if let Ok(absolute) = base.join(&value) {
            el.set_attribute(attr, absolute.as_str())?;
        }
        Ok(())
    });
    (Cow::Owned(parsed), handlers)
}

/// Run the full cleanup pass over one HTML body.
pub fn clean_html(html: &str, options: &CleanupOptions<'_>) -> Result<String> {
    let mut working = if options.include_tags.is_empty() {
        Cow::Borrowed(html)
    } else {
        Cow::Owned(scope_to_include_tags(html, options.include_tags))
    };

    if options.only_main_content && options.include_tags.is_empty() {
        working = Cow::Owned(extract_main_content(&working));
    }

    let mut handlers = Vec::new();
    for tag in ALWAYS_REMOVED {
        handlers.extend(removal_handler(tag));
    }
    if options.only_main_content {
        for tag in BOILERPLATE_TAGS {
            handlers.extend(removal_handler(tag));
        }
    }
    for tag in options.exclude_tags {
        handlers.extend(removal_handler(tag));
    }
    handlers.push(rewrite_attr_handler(
        "a[href]",
        "href",
        options.base_url.clone(),
        false,
    ));
    handlers.push(rewrite_attr_handler(
        "img[src]",
        "src",
        options.base_url.clone(),
        options.remove_base64_images,
    ));
    handlers.push(rewrite_attr_handler(
        "source[src]",
        "src",
        options.base_url.clone(),
        options.remove_base64_images,
    ));
    handlers.push(rewrite_attr_handler(
        "link[href]",
        "href",
        options.base_url.clone(),
        false,
    ));

    let mut output = Vec::with_capacity(working.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );
    rewriter.write(working.as_bytes())?;
    rewriter.end()?;

    Ok(String::from_utf8(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    fn default_options(base_url: &Url) -> CleanupOptions<'_> {
        CleanupOptions {
            base_url,
            only_main_content: false,
            include_tags: &[],
            exclude_tags: &[],
            remove_base64_images: true,
        }
    }

    #[test]
    fn scripts_and_styles_are_removed() {
        let base = base();
        let html = "<div><script>x()</script><style>.a{}</style><p>Keep</p></div>";
        let cleaned = clean_html(html, &default_options(&base)).unwrap();
        assert!(!cleaned.contains("script"));
        assert!(!cleaned.contains(".a{}"));
        assert!(cleaned.contains("<p>Keep</p>"));
    }

    #[test]
    fn relative_urls_are_rewritten_against_the_final_url() {
        let base = base();
        let html = r#"<a href="/about">About</a><img src="pic.png">"#;
        let cleaned = clean_html(html, &default_options(&base)).unwrap();
        assert!(cleaned.contains(r#"href="https://example.com/about""#));
        assert!(cleaned.contains(r#"src="https://example.com/dir/pic.png""#));
    }

    #[test]
    fn base64_data_uris_are_stripped() {
        let base = base();
        let html = r#"<img src="data:image/png;base64,iVBORw0KGgo="><img src="/real.png">"#;
        let cleaned = clean_html(html, &default_options(&base)).unwrap();
        assert!(!cleaned.contains("base64"));
        assert!(cleaned.contains("real.png"));
    }

    #[test]
    fn main_content_mode_drops_boilerplate() {
        let base = base();
        let html = r"<html><body>
            <nav>Navigation</nav>
            <main><p>Main content</p><footer>inner footer</footer></main>
        </body></html>";
        let options = CleanupOptions {
            only_main_content: true,
            ..default_options(&base)
        };
        let cleaned = clean_html(html, &options).unwrap();
        assert!(cleaned.contains("Main content"));
        assert!(!cleaned.contains("Navigation"));
        assert!(!cleaned.contains("inner footer"));
    }

    #[test]
    fn include_tags_scope_the_output() {
        let base = base();
        let html = r#"<div class="a"><p>wanted</p></div><div class="b"><p>unwanted</p></div>"#;
        let include = vec![".a".to_string()];
        let options = CleanupOptions {
            include_tags: &include,
            ..default_options(&base)
        };
        let cleaned = clean_html(html, &options).unwrap();
        assert!(cleaned.contains("wanted"));
        assert!(!cleaned.contains("unwanted"));
    }

    #[test]
    fn exclude_tags_are_removed() {
        let base = base();
        let html = "<div><span class='ad'>buy now</span><p>content</p></div>";
        let exclude = vec![".ad".to_string()];
        let options = CleanupOptions {
            exclude_tags: &exclude,
            ..default_options(&base)
        };
        let cleaned = clean_html(html, &options).unwrap();
        assert!(!cleaned.contains("buy now"));
        assert!(cleaned.contains("content"));
    }
}
