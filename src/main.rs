use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use pagemill::{router, AppConfig, AppContext};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = format!("{}:{}", config.host, config.port);
    let context = Arc::new(AppContext::new(config).context("failed to build app context")?);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "pagemill listening");

    axum::serve(listener, router(context))
        .await
        .context("server error")?;
    Ok(())
}
