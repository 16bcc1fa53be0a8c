use std::path::PathBuf;

use displaydoc::Display;
use thiserror::Error;

/// Error taxonomy for the store, scanner, and feed.
///
/// Only `StorageContended` represents an exhausted retry budget; everything
/// else surfaces on first occurrence. `Cancelled` is a normal terminal
/// outcome of cooperative cancellation, not a failure.
#[derive(Debug, Error, Display)]
pub enum Error {
    /// invalid path: {0}
    Validation(String),
    /// file not found: {0:?}
    NotFound(PathBuf),
    /// storage contended after {attempts} attempts: {source}
    StorageContended {
        attempts: u32,
        source: rusqlite::Error,
    },
    /// rusqlite: {0}
    Sqlite(#[from] rusqlite::Error),
    /// metadata extraction failed: {0}
    Extraction(String),
    /// operation cancelled
    Cancelled,
    /// store initialization failed: {0}
    Initialization(String),
}
