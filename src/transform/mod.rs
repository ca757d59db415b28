//! Document transformers
//!
//! The fixed post-acquisition pipeline: metadata extraction, HTML
//! cleanup, Markdown conversion, link and image extraction. Each
//! transformer catches its own failures; a transformer error degrades
//! the document instead of failing the scrape.

pub mod cleanup;
pub mod links;
pub mod markdown;
pub mod metadata;

pub use cleanup::{clean_html, extract_main_content, CleanupOptions};
pub use links::{extract_images, extract_links};
pub use markdown::html_to_markdown;
pub use metadata::{extract_metadata, PageMetadata};
