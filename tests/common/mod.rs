//! Shared helpers for the integration test suite

use pagemill::config::AppConfig;
use pagemill::context::AppContext;
use pagemill::crawl::blocklist::Blocklist;
use pagemill::dispatch::Dispatchers;
use pagemill::gatekeeper::rules::{RulesFile, Thresholds};
use pagemill::gatekeeper::Gatekeeper;
use pagemill::robots::RobotsEvaluator;
use pagemill::scrape::engines::ValidatorCache;

/// Context wired for tests: local egress allowed so mock servers on
/// loopback are reachable.
#[allow(dead_code)]
pub fn test_context() -> AppContext {
    let config = AppConfig {
        allow_local_webhooks: true,
        ..AppConfig::default()
    };
    AppContext::new(config).expect("test context")
}

/// Context with an in-memory gatekeeper rules file.
#[allow(dead_code)]
pub fn test_context_with_rules(rules: RulesFile) -> AppContext {
    let config = AppConfig {
        allow_local_webhooks: true,
        ..AppConfig::default()
    };
    let thresholds = Thresholds {
        min_html_bytes: config.min_html_bytes,
        min_visible_text_chars: config.min_visible_text_chars,
        min_main_content_chars: config.min_main_content_chars,
        require_structured_data: false,
    };
    AppContext {
        dispatchers: Dispatchers::new(&config).expect("dispatchers"),
        validator_cache: ValidatorCache::new(),
        gatekeeper: Gatekeeper::with_rules(rules, thresholds),
        blocklist: Blocklist::new(&config.blocklist_allowed_domains),
        robots: RobotsEvaluator::new(),
        config,
    }
}

/// A complete HTML page with enough body text to clear the default
/// quality thresholds.
#[allow(dead_code)]
pub fn rich_page(title: &str, extra: &str) -> String {
    let filler = "Readable sentence with enough words to count. ".repeat(60);
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><title>{title}</title></head>\
         <body><main><h1>{title}</h1><p>{filler}</p>{extra}</main></body></html>"
    )
}

/// A one-page PDF built with lopdf, so parse-mode tests run against a
/// structurally valid file.
#[allow(dead_code)]
pub fn sample_pdf(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}
