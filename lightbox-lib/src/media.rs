use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::extract::MediaMetadata;
use crate::store::media_sql::MediaRow;

/// EXIF orientation values 1 through 8, plus `Unknown` for anything a codec
/// failed to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Orientation {
    #[default]
    Unknown,
    Normal,
    MirrorHorizontal,
    Rotate180,
    MirrorVertical,
    MirrorHorizontalRotate270,
    Rotate90,
    MirrorHorizontalRotate90,
    Rotate270,
}

impl Orientation {
    pub fn from_exif(value: u16) -> Self {
        match value {
            1 => Self::Normal,
            2 => Self::MirrorHorizontal,
            3 => Self::Rotate180,
            4 => Self::MirrorVertical,
            5 => Self::MirrorHorizontalRotate270,
            6 => Self::Rotate90,
            7 => Self::MirrorHorizontalRotate90,
            8 => Self::Rotate270,
            _ => Self::Unknown,
        }
    }

    pub fn as_exif(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::Normal => 1,
            Self::MirrorHorizontal => 2,
            Self::Rotate180 => 3,
            Self::MirrorVertical => 4,
            Self::MirrorHorizontalRotate270 => 5,
            Self::Rotate90 => 6,
            Self::MirrorHorizontalRotate90 => 7,
            Self::Rotate270 => 8,
        }
    }
}

/// One indexed media file, keyed by its absolute path.
///
/// `thumbnail: None` is a valid persisted state: the file was scanned but no
/// preview could be produced. A missing row means the file was never scanned.
#[derive(Debug, Clone, Serialize)]
pub struct MediaRecord {
    pub path: PathBuf,
    /// Capture time as epoch seconds, UTC.
    pub taken_at: i64,
    /// Where the capture time came from, e.g. "Exif" or "FileSystem".
    pub taken_at_source: String,
    /// May be empty when the codec reported nothing.
    pub camera_make: String,
    /// May be empty; a model name is only meaningful within its make.
    pub camera_model: String,
    pub orientation: Orientation,
    /// Deduplicated, order-preserving tag set.
    pub tags: Vec<String>,
    pub thumbnail: Option<Vec<u8>>,
}

impl MediaRecord {
    pub fn from_metadata(path: &Path, metadata: MediaMetadata) -> Self {
        Self {
            path: path.to_path_buf(),
            taken_at: metadata.taken_at.timestamp(),
            taken_at_source: metadata.taken_at_source,
            camera_make: metadata.camera_make,
            camera_model: metadata.camera_model,
            orientation: metadata.orientation,
            tags: dedup_tags(metadata.tags),
            thumbnail: metadata.thumbnail,
        }
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail.as_ref().is_some_and(|t| !t.is_empty())
    }
}

impl From<MediaRow> for MediaRecord {
    fn from(value: MediaRow) -> Self {
        Self {
            path: value.filepath.into(),
            taken_at: value.taken_at,
            taken_at_source: value.source,
            camera_make: value.make,
            camera_model: value.model,
            orientation: value.orientation.into(),
            tags: value.tags.into(),
            thumbnail: value.thumbnail,
        }
    }
}

/// Drop repeated and empty tags while preserving first-seen order.
pub(crate) fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
        .collect()
}
