//! Engine-fallback orchestration
//!
//! Builds the ordered engine list from the feature flags, runs up to
//! three escalation rounds, applies the acceptance predicate to each
//! engine result, and finalizes the winning result into a document by
//! running the transformer pipeline.

use url::Url;

use crate::context::AppContext;
use crate::error::{EngineError, PipelineResult};
use crate::gatekeeper::{GateInput, GateReport};
use crate::scrape::document::{Document, DocumentMetadata};
use crate::scrape::engines::{
    browser::BrowserEngine, document::DocumentEngine, engine_order, fetch::FetchEngine,
    pdf::PdfEngine, Engine, EngineDeps, EngineKind, EngineOutcome, EngineResult,
};
use crate::scrape::meta::Meta;
use crate::scrape::options::Format;
use crate::transform::{
    clean_html, extract_images, extract_links, extract_metadata, html_to_markdown, CleanupOptions,
};

/// Outer feature-escalation rounds before giving up.
const MAX_ESCALATION_ROUNDS: usize = 3;

fn make_engine<'a>(kind: EngineKind, deps: EngineDeps<'a>) -> Box<dyn Engine + 'a> {
    match kind {
        EngineKind::Fetch => Box::new(FetchEngine { deps }),
        EngineKind::Browser => Box::new(BrowserEngine::new(deps)),
        EngineKind::Pdf => Box::new(PdfEngine { deps }),
        EngineKind::Document => Box::new(DocumentEngine { deps }),
    }
}

fn markdown_cleanup_options<'a>(meta: &'a Meta, base: &'a Url, main_content: bool) -> CleanupOptions<'a> {
    CleanupOptions {
        base_url: base,
        only_main_content: main_content,
        include_tags: &meta.options.include_tags,
        exclude_tags: &meta.options.exclude_tags,
        remove_base64_images: meta.options.remove_base64_images(),
    }
}

/// Derive Markdown from an engine result, retrying once without
/// main-content extraction when the first pass comes back empty.
fn derive_markdown(meta: &Meta, base: &Url, html: &str) -> Option<String> {
    let main_mode = meta.options.only_main_content();
    let cleaned = match clean_html(html, &markdown_cleanup_options(meta, base, main_mode)) {
        Ok(cleaned) => cleaned,
        Err(e) => {
            tracing::warn!(url = %meta.url, error = %e, "markdown cleanup failed");
            return None;
        }
    };
    let markdown = html_to_markdown(&cleaned);
    if !markdown.trim().is_empty() || !main_mode {
        return Some(markdown);
    }

    // Main-content extraction can swallow pages with unusual layout;
    // one retry over the full document.
    let cleaned = clean_html(html, &markdown_cleanup_options(meta, base, false)).ok()?;
    Some(html_to_markdown(&cleaned))
}

struct Accepted {
    result: EngineResult,
    markdown: Option<String>,
    gate_report: Option<GateReport>,
}

/// Run the fallback loop to its first acceptable result.
pub async fn run(ctx: &AppContext, meta: &mut Meta) -> PipelineResult<Document> {
    let deps = EngineDeps {
        config: &ctx.config,
        dispatchers: &ctx.dispatchers,
        validator_cache: &ctx.validator_cache,
    };
    let browser_configured = ctx.config.browser_service_url.is_some();
    let mut last_error: Option<EngineError> = None;

    'rounds: for round in 0..MAX_ESCALATION_ROUNDS {
        let order = engine_order(meta.features, browser_configured);
        tracing::debug!(
            request_id = %meta.id,
            url = %meta.url,
            round,
            engines = ?order.iter().map(|k| k.name()).collect::<Vec<_>>(),
            "starting engine round"
        );

        for kind in order {
            let engine = make_engine(kind, deps);
            let outcome = meta.abort.scope(async { Ok(engine.run(meta).await) }).await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(cancelled) => return Err(cancelled),
            };

            match outcome {
                EngineOutcome::Escalate(flags) => {
                    if meta.features.merge(flags) {
                        tracing::debug!(request_id = %meta.id, engine = %kind,
                            "feature escalation; restarting engine list");
                        continue 'rounds;
                    }
                    // The flag was already set; nothing new to try.
                    last_error = Some(EngineError::Unsuccessful(kind.name()));
                }
                EngineOutcome::Transport(err) => {
                    tracing::warn!(request_id = %meta.id, engine = %kind, error = %err,
                        "engine transport failure");
                    last_error = Some(err);
                }
                EngineOutcome::Unsuccessful => {
                    tracing::debug!(request_id = %meta.id, engine = %kind,
                        "engine produced no usable content");
                    last_error = Some(EngineError::Unsuccessful(kind.name()));
                }
                EngineOutcome::Ok(result) => {
                    match evaluate(ctx, meta, result) {
                        Some(accepted) => return Ok(finalize(meta, accepted)),
                        None => {
                            last_error = Some(EngineError::Unsuccessful(kind.name()));
                        }
                    }
                }
            }
        }
        break;
    }

    Err(last_error.unwrap_or(EngineError::NoEnginesLeft))
}

/// Apply the acceptance predicate: accept when the derived Markdown
/// (or the trimmed HTML) is non-empty, or when a definitive non-2xx
/// status authoritatively answered the request.
fn evaluate(ctx: &AppContext, meta: &Meta, result: EngineResult) -> Option<Accepted> {
    let base = Url::parse(&result.final_url).unwrap_or_else(|_| meta.url.clone());
    let binary_payload = result.markdown.is_some();

    // The gatekeeper looks at HTML responses only; engine-extracted
    // payloads carry their own metadata.
    let gate_report = if binary_payload {
        None
    } else {
        Some(ctx.gatekeeper.classify(&GateInput {
            html: &result.html,
            status_code: result.status_code,
            final_url: &result.final_url,
        }))
    };

    let markdown = if result.markdown.is_some() {
        result.markdown.clone()
    } else if meta.options.wants(Format::Markdown) {
        derive_markdown(meta, &base, &result.html)
    } else {
        None
    };

    let has_content = markdown
        .as_deref()
        .map(|m| !m.trim().is_empty())
        .unwrap_or(false)
        || !result.html.trim().is_empty();
    let authoritative_failure = !result.is_success_status();

    if has_content || authoritative_failure {
        Some(Accepted {
            result,
            markdown,
            gate_report,
        })
    } else {
        None
    }
}

/// Build the final document: metadata, requested formats, transformer
/// pipeline. Transformer failures degrade the output, never the
/// request.
fn finalize(meta: &Meta, accepted: Accepted) -> Document {
    let Accepted {
        result,
        markdown,
        gate_report,
    } = accepted;

    let base = Url::parse(&result.final_url).unwrap_or_else(|_| meta.url.clone());
    let binary_payload = result.markdown.is_some();
    let formats = meta.options.requested_formats();

    let mut metadata = DocumentMetadata {
        source_url: meta.source_url.clone(),
        url: result.final_url.clone(),
        status_code: result.status_code,
        content_type: result.content_type.clone(),
        proxy_used: result.proxy_used,
        render_status: result.render_status,
        gatekeeper: gate_report,
        browser_evidence: result.upstream_evidence.clone(),
        scraped_at: Some(chrono::Utc::now()),
        ..DocumentMetadata::default()
    };

    if let Some(pdf) = &result.pdf_metadata {
        metadata.num_pages = Some(pdf.num_pages);
        metadata.title = pdf.title.clone();
    }

    if !binary_payload && !result.html.is_empty() {
        let page = extract_metadata(&result.html, &base);
        if metadata.title.is_none() {
            metadata.title = page.title;
        }
        metadata.description = page.description;
        metadata.language = page.language;
        metadata.canonical_url = page.canonical_url;
        metadata.og_title = page.og_title;
        metadata.og_description = page.og_description;
        metadata.og_image = page.og_image;
        metadata.favicon = page.favicon;
    }

    let mut document = Document {
        metadata,
        ..Document::default()
    };

    // Fixed transformer order, independent of the caller's format
    // ordering.
    const TRANSFORM_ORDER: [Format; 5] = [
        Format::Markdown,
        Format::Html,
        Format::RawHtml,
        Format::Links,
        Format::Images,
    ];
    for format in TRANSFORM_ORDER {
        if !formats.contains(&format) {
            continue;
        }
        match format {
            Format::Markdown => {
                document.markdown = Some(markdown.clone().unwrap_or_default());
            }
            Format::RawHtml => {
                document.raw_html = Some(result.html.clone());
            }
            Format::Html => {
                if binary_payload {
                    document.html = Some(result.html.clone());
                } else {
                    let options = markdown_cleanup_options(
                        meta,
                        &base,
                        meta.options.only_main_content(),
                    );
                    match clean_html(&result.html, &options) {
                        Ok(cleaned) => document.html = Some(cleaned),
                        Err(e) => {
                            tracing::warn!(url = %meta.url, error = %e, "html cleanup failed");
                            document.html = Some(String::new());
                        }
                    }
                }
            }
            Format::Links => {
                document.links = Some(if binary_payload {
                    Vec::new()
                } else {
                    extract_links(&result.html, &base)
                });
            }
            Format::Images => {
                document.images = Some(if binary_payload {
                    Vec::new()
                } else {
                    extract_images(&result.html, &base, meta.options.remove_base64_images())
                });
            }
        }
    }

    document
}
