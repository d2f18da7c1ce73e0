//! # pagekeep - Fetch, clean and cache web pages
//!
//! This crate implements a crawl-and-cache pipeline: given a URL it decides
//! whether a previously stored copy is still fresh, and if not acquires a new
//! render of the page, extracts readable text and metadata from the markup,
//! normalizes it, and persists a record keyed by URL.
//!
//! ## Features
//!
//! - Freshness policy with a configurable staleness window
//! - Content extraction that strips page chrome and picks the main block
//! - Punctuation and quote normalization for extracted text
//! - Idempotent upsert-by-URL storage on LibSQL
//! - Pluggable acquisition backend behind a single serialized session
//! - Thin JSON API over the pipeline
//!
//! ## Example
//!
//! ```rust,no_run
//! use pagekeep::crawler::{CrawlOrchestrator, CrawlerConfig, HttpRenderer};
//! use pagekeep::store::PageStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CrawlerConfig::default();
//!     let store = PageStore::open(&config.database_path).await?;
//!     let renderer = HttpRenderer::new(config.user_agent.clone());
//!     let orchestrator = CrawlOrchestrator::new(store, renderer, config);
//!
//!     let obtained = orchestrator.obtain("https://example.com").await?;
//!     println!("{} (cached: {})", obtained.record.title, obtained.served_from_cache);
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod crawler;
mod error;
pub mod store;

pub use error::Error;

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::crawler::{CrawlError, CrawlOrchestrator, CrawlerConfig, Obtained};
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::store::{PageRecord, PageStore, StorageError};
}
