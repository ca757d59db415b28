//! PDF acquisition engine
//!
//! Pass-through mode returns the downloaded bytes base64-encoded so
//! later stages see non-empty content; parse mode extracts page count,
//! title and text, failing fast when the remaining scrape budget
//! cannot cover the extraction cost.

use async_trait::async_trait;
use base64::Engine as _;
use lopdf::Object;
use tokio::io::AsyncWriteExt;

use crate::config::PDF_MS_PER_PAGE;
use crate::dispatch::{header_map, normalize_transport_error};
use crate::error::EngineError;
use crate::scrape::document::{PdfMetadata, ProxyTag};
use crate::scrape::meta::Meta;
use crate::scrape::options::PdfMode;

use super::{Engine, EngineDeps, EngineKind, EngineOutcome, EngineResult};

/// Whether a downloaded body is an HTML interstitial rather than the
/// binary we asked for.
pub(super) fn looks_like_html(bytes: &[u8], content_type: Option<&str>) -> bool {
    if content_type
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
    {
        return true;
    }
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let trimmed = head.trim_start().to_ascii_lowercase();
    trimmed.starts_with("<!doctype") || trimmed.starts_with("<html")
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&utf16)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn pdf_title(doc: &lopdf::Document) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let dict = match info {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    match dict.get(b"Title").ok()? {
        Object::String(bytes, _) => {
            let title = decode_pdf_string(bytes);
            let title = title.trim();
            (!title.is_empty()).then(|| title.to_string())
        }
        _ => None,
    }
}

/// Minimal escaping so extracted text is safe to carry in the html
/// field.
fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn load_pdf(path: std::path::PathBuf) -> Result<(lopdf::Document, u32, Option<String>), String> {
    let doc = lopdf::Document::load(&path).map_err(|e| format!("pdf load failed: {e}"))?;
    let num_pages = doc.get_pages().len() as u32;
    let title = pdf_title(&doc);
    Ok((doc, num_pages, title))
}

fn extract_pdf_text(doc: &lopdf::Document, pages: u32) -> Result<String, String> {
    let page_numbers: Vec<u32> = (1..=pages).collect();
    doc.extract_text(&page_numbers)
        .map_err(|e| format!("pdf text extraction failed: {e}"))
}

pub struct PdfEngine<'a> {
    pub deps: EngineDeps<'a>,
}

impl PdfEngine<'_> {
    async fn download(&self, meta: &Meta) -> Result<(Vec<u8>, String, u16, Option<String>), EngineError> {
        self.deps.dispatchers.guard(&meta.url).await?;
        let client = self.deps.dispatchers.client(meta.options.skip_tls(), false);
        let response = client
            .get(meta.url.clone())
            .headers(header_map(&meta.options.headers))
            .send()
            .await
            .map_err(|e| normalize_transport_error(&e, meta.url.as_str()))?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| normalize_transport_error(&e, meta.url.as_str()))?;
        Ok((bytes.to_vec(), final_url, status, content_type))
    }
}

#[async_trait]
impl Engine for PdfEngine<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Pdf
    }

    async fn run(&self, meta: &Meta) -> EngineOutcome {
        let (bytes, final_url, status, content_type) = match self.download(meta).await {
            Ok(parts) => parts,
            Err(err) => return EngineOutcome::Transport(err),
        };

        let is_pdf_type = content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/pdf"))
            .unwrap_or(false);

        if looks_like_html(&bytes, content_type.as_deref()) {
            return EngineOutcome::Transport(EngineError::PdfAntibot);
        }

        match meta.options.pdf_mode() {
            PdfMode::PassThrough => {
                if !is_pdf_type && !meta.features.pdf {
                    return EngineOutcome::Unsuccessful;
                }
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                EngineOutcome::Ok(EngineResult {
                    final_url,
                    html: encoded.clone(),
                    status_code: status,
                    content_type,
                    proxy_used: ProxyTag::Basic,
                    render_status: None,
                    pdf_metadata: None,
                    markdown: Some(encoded),
                    upstream_evidence: None,
                    set_cookie: false,
                })
            }
            PdfMode::Parse { max_pages } => {
                // Spool to a unique temp file; it is unlinked on every
                // exit path when the handle drops.
                let temp = match tempfile::NamedTempFile::new() {
                    Ok(temp) => temp,
                    Err(e) => {
                        return EngineOutcome::Transport(EngineError::Internal(format!(
                            "temp file creation failed: {e}"
                        )));
                    }
                };
                let path = temp.path().to_path_buf();
                let mut file = match tokio::fs::File::create(&path).await {
                    Ok(file) => file,
                    Err(e) => {
                        return EngineOutcome::Transport(EngineError::Internal(format!(
                            "temp file open failed: {e}"
                        )));
                    }
                };
                if let Err(e) = file.write_all(&bytes).await {
                    return EngineOutcome::Transport(EngineError::Internal(format!(
                        "temp file write failed: {e}"
                    )));
                }
                drop(file);

                // Page count first; the parse budget is checked before
                // committing to full extraction.
                let load_path = path.clone();
                let loaded = tokio::task::spawn_blocking(move || load_pdf(load_path)).await;
                let (doc, num_pages, title) = match loaded {
                    Ok(Ok(loaded)) => loaded,
                    Ok(Err(message)) => {
                        tracing::warn!(url = %meta.url, error = %message, "pdf parse failed");
                        return EngineOutcome::Unsuccessful;
                    }
                    Err(join_err) => {
                        return EngineOutcome::Transport(EngineError::Internal(format!(
                            "pdf parse task failed: {join_err}"
                        )));
                    }
                };

                let effective = max_pages.map_or(num_pages, |cap| num_pages.min(cap));
                let needed_ms = u64::from(effective) * PDF_MS_PER_PAGE;
                if let Some(remaining_ms) = meta.abort.remaining_ms() {
                    if needed_ms > remaining_ms {
                        return EngineOutcome::Transport(EngineError::PdfInsufficientTime {
                            pages: effective,
                            needed_ms,
                            remaining_ms,
                        });
                    }
                }

                let extracted = tokio::task::spawn_blocking(move || {
                    extract_pdf_text(&doc, effective)
                })
                .await;
                let text = match extracted {
                    Ok(Ok(text)) => text.trim().to_string(),
                    Ok(Err(message)) => {
                        tracing::warn!(url = %meta.url, error = %message, "pdf parse failed");
                        return EngineOutcome::Unsuccessful;
                    }
                    Err(join_err) => {
                        return EngineOutcome::Transport(EngineError::Internal(format!(
                            "pdf parse task failed: {join_err}"
                        )));
                    }
                };

                let escaped = escape_text(&text);
                EngineOutcome::Ok(EngineResult {
                    final_url,
                    html: escaped.clone(),
                    status_code: status,
                    content_type,
                    proxy_used: ProxyTag::Basic,
                    render_status: None,
                    pdf_metadata: Some(PdfMetadata { num_pages, title }),
                    markdown: Some(escaped),
                    upstream_evidence: None,
                    set_cookie: false,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_interstitial_is_detected() {
        assert!(looks_like_html(b"<!DOCTYPE html><html>", None));
        assert!(looks_like_html(b"  <html lang=\"en\">", None));
        assert!(looks_like_html(b"%PDF-1.7", Some("text/html")));
        assert!(!looks_like_html(b"%PDF-1.7 binary", Some("application/pdf")));
    }

    #[test]
    fn pdf_strings_decode_utf16_and_latin() {
        let utf16 = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_pdf_string(&utf16), "Hi");
        assert_eq!(decode_pdf_string(b"Plain"), "Plain");
    }

    #[test]
    fn escaped_text_is_html_safe() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
    }
}
