//! Database operations for the page store

use crate::store::error::StorageError;
use crate::store::schema;
use crate::store::{CleanPage, PageFilter, PageListing, PageRecord, PageUpdate};
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Rows, params};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

const RECORD_COLUMNS: &str =
    "id, url, title, description, content, raw_markup, last_refreshed_at";

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// URL-keyed store of crawled pages.
///
/// Every operation opens its own short-lived connection, so the store can be
/// cloned freely and shared across tasks.
#[derive(Clone)]
pub struct PageStore {
    db: Arc<libsql::Database>,
}

impl PageStore {
    /// Open (or create) a store at `path`, creating parent directories and the
    /// schema as needed
    #[instrument]
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;

        let store = Self { db: Arc::new(db) };

        let conn = store.connect().await?;
        conn.query("PRAGMA journal_mode = WAL", params![])
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to enable WAL: {}", e)))?;
        schema::initialize_schema(&conn).await?;

        Ok(store)
    }

    async fn connect(&self) -> Result<Connection, StorageError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StorageError::Connection(format!("Failed to connect to database: {}", e)))?;

        conn.query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS), params![])
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to set busy timeout: {}", e)))?;

        Ok(conn)
    }

    /// Get a page by its canonical URL
    pub async fn find_by_url(&self, url: &str) -> Result<Option<PageRecord>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM crawled_pages WHERE url = ?", RECORD_COLUMNS),
                params![url.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to get page: {}", e)))?;

        next_record(&mut rows).await
    }

    /// Get a page by its ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<PageRecord>, StorageError> {
        let conn = self.connect().await?;
        find_by_id_with(&conn, id).await
    }

    /// Insert a page, or update every mutable field of the existing page with
    /// the same URL.
    ///
    /// `last_refreshed_at` is set to now but never moves backwards. Concurrent
    /// writers for the same URL resolve as last writer wins.
    #[instrument(skip(self, page), fields(url = %page.url))]
    pub async fn upsert(&self, page: &PageUpdate) -> Result<PageRecord, StorageError> {
        let now = Utc::now().timestamp_micros();
        let conn = self.connect().await?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| StorageError::Transaction(format!("Failed to start transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO crawled_pages (url, title, description, content, raw_markup, last_refreshed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(url) DO UPDATE SET
             title = excluded.title,
             description = excluded.description,
             content = excluded.content,
             raw_markup = excluded.raw_markup,
             last_refreshed_at = MAX(crawled_pages.last_refreshed_at, excluded.last_refreshed_at)",
            params![
                page.url.clone(),
                page.title.clone(),
                page.description.clone(),
                page.content.clone(),
                page.raw_markup.clone(),
                now,
            ],
        )
        .await
        .map_err(|e| StorageError::Query(format!("Failed to upsert page: {}", e)))?;

        let mut rows = tx
            .query(
                &format!("SELECT {} FROM crawled_pages WHERE url = ?", RECORD_COLUMNS),
                params![page.url.clone()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to read back page: {}", e)))?;

        let record = next_record(&mut rows).await?.ok_or_else(|| {
            StorageError::Data(format!("Upserted page {} not found", page.url))
        })?;
        drop(rows);

        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(format!("Failed to commit transaction: {}", e)))?;

        debug!("Stored page {} as id {}", record.url, record.id);
        Ok(record)
    }

    /// List pages matching `filter`, most recently refreshed first.
    ///
    /// `page` is 1-based. `total_count` counts every match, not just the
    /// returned page.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &PageFilter,
        page: u32,
        page_size: u32,
    ) -> Result<PageListing, StorageError> {
        if page == 0 || page_size == 0 {
            return Err(StorageError::InvalidPagination { page, page_size });
        }
        let offset = i64::from(page - 1)
            .checked_mul(i64::from(page_size))
            .ok_or(StorageError::InvalidPagination { page, page_size })?;

        let mut clauses = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();
        if let Some(url) = filter.url_contains.as_deref().filter(|s| !s.is_empty()) {
            clauses.push("url LIKE ? ESCAPE '\\'");
            values.push(like_pattern(url).into());
        }
        if let Some(title) = filter.title_contains.as_deref().filter(|s| !s.is_empty()) {
            clauses.push("title LIKE ? ESCAPE '\\'");
            values.push(like_pattern(title).into());
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.connect().await?;

        let mut rows = conn
            .query(
                &format!("SELECT COUNT(*) FROM crawled_pages{}", where_clause),
                values.clone(),
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to count pages: {}", e)))?;
        let total: i64 = match rows.next().await? {
            Some(row) => row
                .get(0)
                .map_err(|e| StorageError::Data(format!("Failed to get count: {}", e)))?,
            None => 0,
        };
        let total_count = u64::try_from(total).unwrap_or(0);

        let mut page_values = values;
        page_values.push(i64::from(page_size).into());
        page_values.push(offset.into());

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM crawled_pages{} ORDER BY last_refreshed_at DESC, id DESC LIMIT ? OFFSET ?",
                    RECORD_COLUMNS, where_clause
                ),
                page_values,
            )
            .await
            .map_err(|e| StorageError::Query(format!("Failed to list pages: {}", e)))?;

        let mut records = Vec::new();
        while let Some(record) = next_record(&mut rows).await? {
            records.push(record);
        }

        Ok(PageListing {
            records,
            total_count,
            page,
            page_size,
            total_pages: total_count.div_ceil(u64::from(page_size)),
        })
    }

    /// Clean export of the pages with the given IDs, in the requested order.
    /// Unknown IDs are skipped.
    pub async fn export_clean(&self, ids: &[i64]) -> Result<Vec<CleanPage>, StorageError> {
        let conn = self.connect().await?;
        let mut pages = Vec::with_capacity(ids.len());
        for &id in ids {
            match find_by_id_with(&conn, id).await? {
                Some(record) => pages.push(record.to_clean()),
                None => debug!("Skipping unknown page id {}", id),
            }
        }
        Ok(pages)
    }
}

async fn find_by_id_with(conn: &Connection, id: i64) -> Result<Option<PageRecord>, StorageError> {
    let mut rows = conn
        .query(
            &format!("SELECT {} FROM crawled_pages WHERE id = ?", RECORD_COLUMNS),
            params![id],
        )
        .await
        .map_err(|e| StorageError::Query(format!("Failed to get page {}: {}", id, e)))?;

    next_record(&mut rows).await
}

async fn next_record(rows: &mut Rows) -> Result<Option<PageRecord>, StorageError> {
    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(StorageError::Data(format!("Failed to read page row: {}", e))),
    }
}

/// Convert a database row to a PageRecord
fn row_to_record(row: &Row) -> Result<PageRecord, StorageError> {
    let micros: i64 = row
        .get(6)
        .map_err(|e| StorageError::Data(format!("Failed to get last_refreshed_at: {}", e)))?;
    let last_refreshed_at = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StorageError::Data(format!("Timestamp out of range: {}", micros)))?;

    Ok(PageRecord {
        id: row
            .get(0)
            .map_err(|e| StorageError::Data(format!("Failed to get id: {}", e)))?,
        url: row
            .get(1)
            .map_err(|e| StorageError::Data(format!("Failed to get url: {}", e)))?,
        title: row
            .get(2)
            .map_err(|e| StorageError::Data(format!("Failed to get title: {}", e)))?,
        description: row
            .get(3)
            .map_err(|e| StorageError::Data(format!("Failed to get description: {}", e)))?,
        content: row
            .get(4)
            .map_err(|e| StorageError::Data(format!("Failed to get content: {}", e)))?,
        raw_markup: row
            .get(5)
            .map_err(|e| StorageError::Data(format!("Failed to get raw_markup: {}", e)))?,
        last_refreshed_at,
    })
}

/// `%text%` with LIKE wildcards in `text` escaped
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
