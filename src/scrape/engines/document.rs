//! Office-document acquisition engine
//!
//! Downloads docx/odt/rtf/xlsx bytes and returns them base64-encoded;
//! parsing the formats is delegated downstream and treated as opaque
//! here. An HTML interstitial where a binary was expected is reported
//! as an antibot block.

use async_trait::async_trait;
use base64::Engine as _;

use crate::dispatch::{header_map, normalize_transport_error};
use crate::error::EngineError;
use crate::scrape::document::ProxyTag;
use crate::scrape::meta::Meta;

use super::pdf::looks_like_html;
use super::{Engine, EngineDeps, EngineKind, EngineOutcome, EngineResult};

pub struct DocumentEngine<'a> {
    pub deps: EngineDeps<'a>,
}

#[async_trait]
impl Engine for DocumentEngine<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Document
    }

    async fn run(&self, meta: &Meta) -> EngineOutcome {
        if let Err(err) = self.deps.dispatchers.guard(&meta.url).await {
            return EngineOutcome::Transport(err);
        }

        let client = self.deps.dispatchers.client(meta.options.skip_tls(), false);
        let response = match client
            .get(meta.url.clone())
            .headers(header_map(&meta.options.headers))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return EngineOutcome::Transport(normalize_transport_error(
                    &err,
                    meta.url.as_str(),
                ));
            }
        };

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return EngineOutcome::Transport(normalize_transport_error(
                    &err,
                    meta.url.as_str(),
                ));
            }
        };

        if looks_like_html(&bytes, content_type.as_deref()) {
            return EngineOutcome::Transport(EngineError::DocumentAntibot);
        }
        if bytes.is_empty() {
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
}
