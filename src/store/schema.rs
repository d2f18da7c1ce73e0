//! # Database Schema Module
//!
//! One table, `crawled_pages`, holds a row per URL. The URL column is unique so
//! writes go through `ON CONFLICT(url) DO UPDATE` and never produce duplicate
//! keys. Timestamps are stored as microseconds since the Unix epoch.

use crate::store::error::StorageError;
use libsql::{Connection, params};

/// Initialize the database schema
pub async fn initialize_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS crawled_pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            raw_markup TEXT NOT NULL DEFAULT '',
            last_refreshed_at INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| StorageError::Schema(format!("Failed to create crawled_pages table: {}", e)))?;

    // Listing is ordered by refresh time
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_crawled_pages_refreshed
         ON crawled_pages(last_refreshed_at DESC)",
        params![],
    )
    .await
    .map_err(|e| StorageError::Schema(format!("Failed to create refresh index: {}", e)))?;

    Ok(())
}
