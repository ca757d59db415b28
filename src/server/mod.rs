//! HTTP surface
//!
//! Thin axum router over the scrape and crawl pipelines. Validation
//! failures return 400 with per-field details; pipeline failures
//! return 502 with a stable `{code, message}` tuple, with verbose
//! detail gated by configuration.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::AppContext;
use crate::crawl::{crawl_site, CrawlOptions};
use crate::error::EngineError;
use crate::scrape::options::{FieldError, ScrapeOptions};
use crate::scrape::scrape_url;

pub type AppState = Arc<AppContext>;

#[derive(Debug, Deserialize)]
struct ScrapeRequest {
    url: String,
    #[serde(flatten)]
    options: ScrapeOptions,
}

#[derive(Debug, Deserialize)]
struct CrawlRequest {
    url: String,
    #[serde(flatten)]
    options: CrawlOptions,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape", post(scrape_handler))
        .route("/crawl", post(crawl_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn validation_response(details: Vec<FieldError>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": "Validation failed",
            "details": details,
        })),
    )
}

fn malformed_body_response(error: &serde_json::Error) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": "Malformed request body",
            "details": [{"field": "body", "message": error.to_string()}],
        })),
    )
}

fn pipeline_error_response(
    state: &AppContext,
    request_id: &str,
    error: &EngineError,
) -> (StatusCode, Json<Value>) {
    let mut body = json!({
        "success": false,
        "requestId": request_id,
        "error": {
            "code": error.public_code(),
            "message": error.public_message(state.config.expose_error_details),
        },
    });
    if state.config.expose_error_stack {
        body["error"]["stack"] = json!(format!("{error:?}"));
    }
    (StatusCode::BAD_GATEWAY, Json(body))
}

async fn scrape_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let request: ScrapeRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => return malformed_body_response(&e),
    };
    if request.url.trim().is_empty() {
        return validation_response(vec![FieldError {
            field: "url",
            message: "url is required".to_string(),
        }]);
    }
    if let Err(details) = request.options.validate() {
        return validation_response(details);
    }

    let request_id = Uuid::new_v4().to_string();
    match scrape_url(&state, &request.url, request.options, None).await {
        Ok(document) => (
            StatusCode::OK,
            Json(json!({"success": true, "document": document})),
        ),
        Err(error) => pipeline_error_response(&state, &request_id, &error),
    }
}

async fn crawl_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let request: CrawlRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => return malformed_body_response(&e),
    };
    if request.url.trim().is_empty() {
        return validation_response(vec![FieldError {
            field: "url",
            message: "url is required".to_string(),
        }]);
    }
    if let Err(details) = request.options.validate() {
        return validation_response(details);
    }

    let request_id = Uuid::new_v4().to_string();
    match crawl_site(&state, &request.url, request.options, None).await {
        Ok(output) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "pages": output.pages,
                "errors": output.errors,
                "stats": output.stats,
            })),
        ),
        Err(error) => pipeline_error_response(&state, &request_id, &error),
    }
}
