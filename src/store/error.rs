//! # Storage Error Types Module
//!
//! This module defines error types for the page store. Every failure of the
//! persistence layer surfaces as a `StorageError` so callers can decide whether
//! to retry or report it; the store never drops a write silently.

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for page store operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// LibSQL error
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Filesystem error while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQL query error
    #[error("SQL query error: {0}")]
    Query(String),

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Data error
    #[error("Data error: {0}")]
    Data(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Page or page size out of range
    #[error("Invalid pagination: page {page}, page size {page_size}")]
    InvalidPagination {
        /// Requested 1-based page
        page: u32,
        /// Requested page size
        page_size: u32,
    },
}

impl From<StorageError> for CrateError {
    fn from(err: StorageError) -> Self {
        CrateError::Database(err.to_string())
    }
}
