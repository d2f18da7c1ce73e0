//! Page store module
//!
//! This module provides the persistent, URL-keyed record store behind the
//! crawl-and-cache pipeline, including lookups, upserts, filtered listing and
//! clean export of stored pages.

mod database;
pub mod error;
mod schema;

pub use database::PageStore;
pub use error::StorageError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// ID assigned by the store on first insert
    pub id: i64,

    /// Canonical URL of the page
    pub url: String,

    /// Title of the page
    pub title: String,

    /// Short description of the page
    pub description: String,

    /// Extracted and normalized body text
    pub content: String,

    /// Unmodified acquired markup
    #[serde(skip_serializing, default)]
    pub raw_markup: String,

    /// Time of the most recent successful acquisition
    pub last_refreshed_at: DateTime<Utc>,
}

impl PageRecord {
    /// Clean view of the record with whitespace collapsed
    pub fn to_clean(&self) -> CleanPage {
        CleanPage {
            url: self.url.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            content: self.content.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Values written by an upsert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageUpdate {
    /// Canonical URL of the page
    pub url: String,

    /// Title of the page
    pub title: String,

    /// Short description of the page
    pub description: String,

    /// Extracted and normalized body text
    pub content: String,

    /// Unmodified acquired markup
    pub raw_markup: String,
}

/// Export form of a page, without markup or bookkeeping fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanPage {
    /// URL of the page
    pub url: String,

    /// Title of the page
    pub title: String,

    /// Short description of the page
    pub description: String,

    /// Body text on a single line
    pub content: String,
}

/// Case-insensitive substring filters for listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFilter {
    /// Only pages whose URL contains this text
    pub url_contains: Option<String>,

    /// Only pages whose title contains this text
    pub title_contains: Option<String>,
}

/// One page of listing results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageListing {
    /// Records on this page, most recently refreshed first
    pub records: Vec<PageRecord>,

    /// Number of records matching the filter across all pages
    pub total_count: u64,

    /// 1-based page number
    pub page: u32,

    /// Maximum records per page
    pub page_size: u32,

    /// Number of pages for the filtered set
    pub total_pages: u64,
}
