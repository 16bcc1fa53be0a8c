//! The narrow boundary to whatever reads per-file metadata.
//!
//! The scanner only ever sees this trait; codec details (EXIF parsing,
//! thumbnail encoding) live behind it.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::media::Orientation;

/// Everything an extractor can learn about one file.
#[derive(Debug, Clone)]
pub struct MediaMetadata {
    pub taken_at: DateTime<Utc>,
    pub taken_at_source: String,
    pub camera_make: String,
    pub camera_model: String,
    pub orientation: Orientation,
    pub tags: Vec<String>,
    pub thumbnail: Option<Vec<u8>>,
}

/// Per-file metadata reader.
///
/// Implementations fail with [`Error::Validation`] for a malformed path and
/// [`Error::NotFound`] for an absent file. For internal codec failures an
/// implementation may instead return placeholder metadata carrying an error
/// annotation tag and the file-creation timestamp, so a scan still has
/// something to persist.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn read(&self, path: &Path) -> Result<MediaMetadata, Error>;

    async fn read_async(&self, path: &Path) -> Result<MediaMetadata, Error> {
        self.read(path)
    }
}
