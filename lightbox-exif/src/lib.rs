//! EXIF-backed [`Extractor`] implementation.
//!
//! Codec failures degrade gracefully: a file we cannot parse still yields
//! metadata carrying the filesystem timestamp (and, for an unreadable file,
//! an error annotation tag) so the scan has something to persist.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Tag};
use image::ImageFormat;
use lightbox_lib::error::Error;
use lightbox_lib::extract::{Extractor, MediaMetadata};
use lightbox_lib::media::Orientation;
use slog::{debug, o, warn, Discard, Logger};

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const DEFAULT_THUMBNAIL_EDGE: u32 = 240;

pub struct ExifExtractor {
    thumbnail_edge: u32,
    logger: Logger,
}

impl Default for ExifExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExifExtractor {
    pub fn new() -> Self {
        Self {
            thumbnail_edge: DEFAULT_THUMBNAIL_EDGE,
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Longest edge of generated thumbnails, in pixels.
    pub fn with_thumbnail_edge(mut self, edge: u32) -> Self {
        self.thumbnail_edge = edge;
        self
    }

    fn read_file(&self, path: &Path) -> Result<MediaMetadata, Error> {
        let file = File::open(path).map_err(|e| Error::Extraction(e.to_string()))?;
        let mut metadata = MediaMetadata {
            taken_at: file_timestamp(path),
            taken_at_source: "FileSystem".to_string(),
            camera_make: String::new(),
            camera_model: String::new(),
            orientation: Orientation::Unknown,
            tags: vec![],
            thumbnail: None,
        };

        // EXIF is optional; files without it keep the filesystem timestamp.
        let mut reader = BufReader::new(&file);
        match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => {
                let date_field = exif
                    .get_field(Tag::DateTimeOriginal, In::PRIMARY)
                    .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY));
                if let Some(field) = date_field {
                    let raw = format!("{}", field.display_value());
                    if let Some(taken_at) = parse_exif_datetime(&raw) {
                        metadata.taken_at = taken_at;
                        metadata.taken_at_source = "Exif".to_string();
                    }
                }
                if let Some(make) = exif.get_field(Tag::Make, In::PRIMARY) {
                    metadata.camera_make = clean_exif_string(&format!("{}", make.display_value()));
                }
                if let Some(model) = exif.get_field(Tag::Model, In::PRIMARY) {
                    metadata.camera_model = clean_exif_string(&format!("{}", model.display_value()));
                }
                if let Some(orientation) = exif.get_field(Tag::Orientation, In::PRIMARY) {
                    if let Some(value) = orientation.value.get_uint(0) {
                        metadata.orientation = orientation_from_uint(value);
                    }
                }
            }
            Err(e) => {
                debug!(self.logger, "no exif data"; "path" => %path.display(), "error" => %e);
            }
        }

        metadata.thumbnail = self.make_thumbnail(path);
        Ok(metadata)
    }

    fn make_thumbnail(&self, path: &Path) -> Option<Vec<u8>> {
        let image = image::open(path).ok()?;
        let thumbnail = image.thumbnail(self.thumbnail_edge, self.thumbnail_edge);
        let mut buf = Cursor::new(Vec::new());
        // JPEG has no alpha channel, so flatten first.
        image::DynamicImage::ImageRgb8(thumbnail.to_rgb8())
            .write_to(&mut buf, ImageFormat::Jpeg)
            .ok()?;
        Some(buf.into_inner())
    }

    fn placeholder(&self, path: &Path, cause: &Error) -> MediaMetadata {
        MediaMetadata {
            taken_at: file_timestamp(path),
            taken_at_source: "FileSystem".to_string(),
            camera_make: String::new(),
            camera_model: String::new(),
            orientation: Orientation::Unknown,
            tags: vec![format!("extract-error: {cause}")],
            thumbnail: None,
        }
    }
}

impl Extractor for ExifExtractor {
    fn read(&self, path: &Path) -> Result<MediaMetadata, Error> {
        if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
            return Err(Error::Validation("path is empty".to_string()));
        }
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        match self.read_file(path) {
            Ok(metadata) => Ok(metadata),
            Err(e) => {
                warn!(self.logger, "substituting placeholder metadata";
                    "path" => %path.display(), "error" => %e);
                Ok(self.placeholder(path, &e))
            }
        }
    }
}

/// EXIF writes `2004:04:09 17:33:15`, which dateparser does not accept, so
/// try the literal format first.
fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = raw.trim().trim_matches('"');
    if let Ok(naive) = NaiveDateTime::parse_from_str(cleaned, EXIF_DATETIME_FORMAT) {
        return naive.and_local_timezone(Utc).single();
    }
    dateparser::parse(cleaned).ok()
}

fn clean_exif_string(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

/// EXIF carries orientation as a 32-bit integer; anything outside the u16
/// range is as meaningless as 0.
fn orientation_from_uint(value: u32) -> Orientation {
    Orientation::from_exif(u16::try_from(value).unwrap_or(0))
}

/// Creation time where the platform records one, otherwise modification
/// time, otherwise now.
fn file_timestamp(path: &Path) -> DateTime<Utc> {
    let time = std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or_else(|_| SystemTime::now());
    DateTime::<Utc>::from(time)
}
