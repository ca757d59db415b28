pub mod abort;
pub mod config;
pub mod context;
pub mod crawl;
pub mod dispatch;
pub mod error;
pub mod gatekeeper;
pub mod robots;
pub mod scrape;
pub mod server;
pub mod sitemap;
pub mod transform;

pub use abort::{AbortHandle, AbortManager, AbortTier};
pub use config::AppConfig;
pub use context::AppContext;
pub use crawl::{crawl_site, CrawlOptions, CrawlOutput, CrawlStats};
pub use error::{EngineError, PipelineResult};
pub use gatekeeper::{BlockClass, ContentStatus, GateReport, Gatekeeper};
pub use scrape::{scrape_url, Document, DocumentMetadata, Format, ScrapeOptions};
pub use server::router;
