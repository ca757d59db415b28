//! End-to-end scrape pipeline tests against a local mock server

mod common;

use common::{rich_page, sample_pdf, test_context, test_context_with_rules};
use pagemill::config::AppConfig;
use pagemill::context::AppContext;
use pagemill::error::EngineError;
use pagemill::gatekeeper::rules::{PartialThresholds, Rule, RuleSet, RulesFile, Signal};
use pagemill::gatekeeper::{BlockClass, ContentStatus};
use pagemill::scrape::scrape_url;
use pagemill::scrape::ScrapeOptions;

fn options(json: serde_json::Value) -> ScrapeOptions {
    serde_json::from_value(json).expect("options")
}

#[tokio::test]
async fn markdown_and_links_from_a_simple_page() {
    let mut server = mockito::Server::new_async().await;
    let _page = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body(r#"<html><body><h1>Example</h1><a href="/about">About</a></body></html>"#)
        .create_async()
        .await;

    let ctx = test_context();
    let document = scrape_url(
        &ctx,
        &server.url(),
        options(serde_json::json!({
            "formats": [{"type": "markdown"}, {"type": "links"}]
        })),
        None,
    )
    .await
    .expect("scrape should succeed");

    let markdown = document.markdown.as_deref().expect("markdown requested");
    assert!(markdown.contains("# Example"), "got: {markdown}");
    assert_eq!(
        document.links.as_deref(),
        Some(&[format!("{}/about", server.url())][..])
    );
    // Formats not requested stay absent.
    assert!(document.raw_html.is_none());
    assert!(document.html.is_none());
    assert!(document.images.is_none());
    assert_eq!(document.metadata.status_code, 200);
}

#[tokio::test]
async fn pdf_parse_mode_reports_pages_and_text() {
    let mut server = mockito::Server::new_async().await;
    let _pdf = server
        .mock("GET", "/paper.pdf")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(sample_pdf("Hello from the paper"))
        .create_async()
        .await;

    let ctx = test_context();
    let document = scrape_url(
        &ctx,
        &format!("{}/paper.pdf", server.url()),
        options(serde_json::json!({
            "formats": [{"type": "markdown"}],
            "parsers": ["pdf"]
        })),
        None,
    )
    .await
    .expect("pdf scrape should succeed");

    assert!(document.metadata.num_pages.unwrap_or(0) >= 1);
    let markdown = document.markdown.as_deref().expect("markdown requested");
    assert!(!markdown.trim().is_empty());
    assert!(markdown.contains("Hello"), "got: {markdown}");
}

#[tokio::test]
async fn challenge_pages_are_classified() {
    let mut server = mockito::Server::new_async().await;
    let _page = server
        .mock("GET", "/")
        .with_status(403)
        .with_header("content-type", "text/html")
        .with_body(
            r#"<html><head><title>Verify you are human</title></head>
               <body><script src="/captcha.js"></script>Checking your browser</body></html>"#,
        )
        .create_async()
        .await;

    let rules = RulesFile {
        global: RuleSet {
            rules: vec![Rule {
                id: "challenge-interstitial".to_string(),
                block_class: BlockClass::Challenge,
                signals: vec![
                    Signal::ContainsScript {
                        value: "captcha".to_string(),
                    },
                    Signal::StatusIn { value: vec![403] },
                ],
                confidence: Some(0.95),
            }],
            thresholds: PartialThresholds::default(),
        },
        domains: Default::default(),
    };

    let ctx = test_context_with_rules(rules);
    let document = scrape_url(&ctx, &server.url(), ScrapeOptions::default(), None)
        .await
        .expect("403 short-circuits into an accepted document");

    let gate = document.metadata.gatekeeper.expect("evidence attached");
    assert_eq!(gate.block_class, BlockClass::Challenge);
    assert_eq!(gate.content_status, ContentStatus::Challenge);
    assert_eq!(document.metadata.status_code, 403);
}

#[tokio::test]
async fn login_redirects_are_classified_with_evidence() {
    let mut server = mockito::Server::new_async().await;
    let _start = server
        .mock("GET", "/account")
        .with_status(301)
        .with_header("location", "/signin")
        .create_async()
        .await;
    let _signin = server
        .mock("GET", "/signin")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>Sign in</body></html>")
        .create_async()
        .await;

    let rules = RulesFile {
        global: RuleSet {
            rules: vec![Rule {
                id: "login-redirect".to_string(),
                block_class: BlockClass::Login,
                signals: vec![Signal::RedirectToLogin {
                    value: vec!["/signin".to_string(), "/login".to_string()],
                }],
                confidence: Some(0.9),
            }],
            thresholds: PartialThresholds::default(),
        },
        domains: Default::default(),
    };

    let ctx = test_context_with_rules(rules);
    let document = scrape_url(
        &ctx,
        &format!("{}/account", server.url()),
        ScrapeOptions::default(),
        None,
    )
    .await
    .expect("scrape should succeed");

    let gate = document.metadata.gatekeeper.expect("evidence attached");
    assert_eq!(gate.block_class, BlockClass::Login);
    assert_eq!(gate.content_status, ContentStatus::Login);
    assert!(gate
        .evidence
        .iter()
        .any(|e| e.matched_signals.iter().any(|s| s == "redirect_to_login")));
    assert!(document.metadata.url.ends_with("/signin"));
}

#[tokio::test]
async fn pdf_content_type_on_html_path_escalates() {
    let mut server = mockito::Server::new_async().await;
    let _page = server
        .mock("GET", "/download")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(sample_pdf("Escalated document"))
        .expect_at_least(2)
        .create_async()
        .await;

    let ctx = test_context();
    let document = scrape_url(
        &ctx,
        &format!("{}/download", server.url()),
        options(serde_json::json!({
            "formats": [{"type": "markdown"}],
            "parsers": ["pdf"]
        })),
        None,
    )
    .await
    .expect("escalated scrape should succeed");

    // The fetch engine saw application/pdf, escalated, and the PDF
    // engine handled the second attempt.
    assert!(document.metadata.num_pages.unwrap_or(0) >= 1);
    assert!(document
        .markdown
        .as_deref()
        .unwrap_or_default()
        .contains("Escalated"));
}

#[tokio::test]
async fn conditional_get_replays_the_cached_body() {
    let mut server = mockito::Server::new_async().await;
    let body = rich_page("Cached", "");
    let first = server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_header("etag", "\"v1\"")
        .with_body(&body)
        .create_async()
        .await;

    let ctx = test_context();
    let url = format!("{}/page", server.url());
    let doc1 = scrape_url(&ctx, &url, ScrapeOptions::default(), None)
        .await
        .expect("first fetch");
    assert!(doc1.markdown.as_deref().unwrap_or_default().contains("Cached"));
    drop(first);
    server.reset_async().await;

    let _revalidated = server
        .mock("GET", "/page")
        .match_header("if-none-match", "\"v1\"")
        .with_status(304)
        .create_async()
        .await;

    let doc2 = scrape_url(&ctx, &url, ScrapeOptions::default(), None)
        .await
        .expect("second fetch");
    assert!(
        doc2.markdown.as_deref().unwrap_or_default().contains("Cached"),
        "cached body should be replayed on 304"
    );
    assert_eq!(doc2.metadata.status_code, 200);
}

#[tokio::test]
async fn private_addresses_are_refused_without_the_policy() {
    let mut server = mockito::Server::new_async().await;
    let _page = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("should never be reached")
        .expect(0)
        .create_async()
        .await;

    // Default config: local egress forbidden.
    let ctx = AppContext::new(AppConfig::default()).expect("context");
    let err = scrape_url(&ctx, &server.url(), ScrapeOptions::default(), None)
        .await
        .expect_err("loopback egress must be refused");
    assert!(matches!(err, EngineError::InsecureConnection(_)), "got: {err}");
}

#[tokio::test]
async fn scrape_timeout_is_attributed() {
    use std::io::Write;

    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/slow")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_chunked_body(|writer| {
            std::thread::sleep(std::time::Duration::from_millis(1500));
            writer.write_all(b"<html><body>late</body></html>")
        })
        .create_async()
        .await;

    let ctx = test_context();
    let err = scrape_url(
        &ctx,
        &format!("{}/slow", server.url()),
        options(serde_json::json!({"timeout": 200})),
        None,
    )
    .await
    .expect_err("scrape must time out");
    assert!(matches!(err, EngineError::Timeout), "got: {err}");
}
