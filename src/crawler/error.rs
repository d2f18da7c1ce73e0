//! Error types for the crawler module

use crate::error::Error as CrateError;
use crate::store::StorageError;
use thiserror::Error;

/// Error type for a single `obtain` call
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The page could not be rendered; any stored copy was left untouched
    #[error("Acquisition failed for {url}: {source}")]
    AcquisitionFailed {
        /// URL that was being acquired
        url: String,
        /// Underlying acquisition failure
        #[source]
        source: AcquisitionError,
    },

    /// Persistence layer error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The requested URL is not a crawlable http(s) URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The orchestrator was shut down
    #[error("Crawler has been shut down")]
    ShutDown,
}

/// Error type for acquisition backends
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Page did not finish loading in time
    #[error("Page load timed out after {0} seconds")]
    Timeout(u64),

    /// Navigation reached the server but did not produce a page
    #[error("Navigation failed with status {status}")]
    Navigation {
        /// HTTP status returned by the server
        status: u16,
    },

    /// The acquisition session could not be started or is unusable
    #[error("Acquisition session unavailable: {0}")]
    Unavailable(String),
}

/// Non-fatal extraction failure, reported for diagnostics only
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailed {
    /// Nothing to parse
    #[error("Markup is empty")]
    EmptyMarkup,

    /// An internal selector could not be compiled
    #[error("Selector error: {0}")]
    Selector(String),

    /// The document parsed but held no visible text
    #[error("No visible text found")]
    NoText,
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Storage(e) => CrateError::Database(e.to_string()),
            CrawlError::InvalidUrl(_) | CrawlError::UrlParse(_) => {
                CrateError::InvalidRequest(err.to_string())
            }
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
