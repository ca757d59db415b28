//! Bounded crawl tests against a local mock server

mod common;

use common::{rich_page, test_context};
use pagemill::crawl::{crawl_site, CrawlOptions};

fn crawl_options(json: serde_json::Value) -> CrawlOptions {
    serde_json::from_value(json).expect("crawl options")
}

fn link_list(count: usize) -> String {
    (1..=count)
        .map(|i| format!(r#"<a href="/p{i}">Page {i}</a>"#))
        .collect()
}

#[tokio::test]
async fn crawl_respects_limit_and_robots() {
    let mut server = mockito::Server::new_async().await;

    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private")
        .create_async()
        .await;

    let home_links = format!(
        "{}{}",
        link_list(8),
        r#"<a href="/private/a">secret a</a><a href="/private/b">secret b</a>"#
    );
    let _home = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(rich_page("Home", &home_links))
        .create_async()
        .await;

    for i in 1..=8 {
        let _ = server
            .mock("GET", format!("/p{i}").as_str())
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(rich_page(&format!("Page {i}"), ""))
            .create_async()
            .await;
    }

    let ctx = test_context();
    let output = crawl_site(
        &ctx,
        &server.url(),
        crawl_options(serde_json::json!({"limit": 5, "maxDepth": 1})),
        None,
    )
    .await
    .expect("crawl should succeed");

    assert!(output.stats.processed <= 5, "stats: {:?}", output.stats);
    assert_eq!(
        output.stats.succeeded + output.stats.failed,
        output.stats.processed,
        "stats: {:?}",
        output.stats
    );
    assert!(output.stats.discovered <= 11, "stats: {:?}", output.stats);
    assert!(
        output
            .pages
            .iter()
            .all(|p| !p.metadata.url.contains("/private")),
        "robots-disallowed pages must never be scraped"
    );
    assert!(!output.pages.is_empty());
}

#[tokio::test]
async fn crawl_depth_bound_stops_link_expansion() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    let _home = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(rich_page("Home", r#"<a href="/level1">deeper</a>"#))
        .create_async()
        .await;
    let _level1 = server
        .mock("GET", "/level1")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(rich_page("Level 1", r#"<a href="/level2">deeper still</a>"#))
        .create_async()
        .await;
    let level2 = server
        .mock("GET", "/level2")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(rich_page("Level 2", ""))
        .expect(0)
        .create_async()
        .await;

    let ctx = test_context();
    let output = crawl_site(
        &ctx,
        &server.url(),
        crawl_options(serde_json::json!({"limit": 10, "maxDepth": 1})),
        None,
    )
    .await
    .expect("crawl should succeed");

    level2.assert_async().await;
    assert_eq!(output.stats.processed, 2);
    assert!(output
        .pages
        .iter()
        .all(|p| !p.metadata.url.contains("level2")));
}

#[tokio::test]
async fn crawl_strips_internal_raw_html_from_pages() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    let _home = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(rich_page("Solo", ""))
        .create_async()
        .await;

    let ctx = test_context();
    let output = crawl_site(
        &ctx,
        &server.url(),
        crawl_options(serde_json::json!({
            "limit": 1,
            "scrapeOptions": {"formats": ["markdown"]}
        })),
        None,
    )
    .await
    .expect("crawl should succeed");

    assert_eq!(output.pages.len(), 1);
    let page = &output.pages[0];
    // rawHtml was added internally for link extraction only.
    assert!(page.raw_html.is_none());
    assert!(page.markdown.is_some());
}

#[tokio::test]
async fn crawl_excludes_filter_discovered_links() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    let _home = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(rich_page(
            "Home",
            r#"<a href="/keep">keep</a><a href="/skip-me">skip</a>"#,
        ))
        .create_async()
        .await;
    let _keep = server
        .mock("GET", "/keep")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(rich_page("Keep", ""))
        .create_async()
        .await;
    let skipped = server
        .mock("GET", "/skip-me")
        .with_status(200)
        .with_body(rich_page("Skip", ""))
        .expect(0)
        .create_async()
        .await;

    let ctx = test_context();
    let output = crawl_site(
        &ctx,
        &server.url(),
        crawl_options(serde_json::json!({
            "limit": 10,
            "maxDepth": 2,
            "excludes": ["skip-me"]
        })),
        None,
    )
    .await
    .expect("crawl should succeed");

    skipped.assert_async().await;
    assert_eq!(output.stats.processed, 2);
}
