//! # Crawl-and-Cache Pipeline
//!
//! This module holds everything between "a URL was requested" and "a clean
//! record was stored". It decides whether a cached copy is still usable,
//! drives the acquisition backend when it is not, and turns raw markup into
//! normalized text before handing it to the page store.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: Staleness window, acquisition timeouts and paths
//! - `CrawlOrchestrator`: Coordinates the pipeline and exposes `obtain`
//! - `Acquisition`: Capability trait for whatever renders a URL into markup
//! - `HttpRenderer`: Default acquisition backend built on reqwest
//! - `extract`: Content and metadata extraction from raw markup
//! - `TextNormalizer`: Punctuation and quote normalization
//! - `is_stale`: Freshness decision for stored records
//!
//! ## Usage
//!
//! Build a `CrawlOrchestrator` from a `PageStore`, an acquisition backend and
//! a config, then call `obtain` for each URL. Call `shutdown` before exiting
//! so the acquisition session is released.

mod acquisition;
mod config;
mod content_extraction;
mod error;
mod freshness;
mod normalize;
mod orchestrator;

pub use acquisition::{Acquisition, HttpRenderer, RenderOptions, RenderedPage};
pub use config::{CrawlerConfig, CrawlerConfigBuilder};
pub use content_extraction::{ExtractedPage, Extraction, extract, extract_metadata};
pub use error::{AcquisitionError, CrawlError, ExtractionFailed};
pub use freshness::{DEFAULT_THRESHOLD_DAYS, is_stale, is_stale_at};
pub use normalize::{Lang, TextNormalizer, normalize_text};
pub use orchestrator::{CrawlOrchestrator, Obtained};
