//! Bounded-concurrency folder scanner.
//!
//! Discovers candidate media files, skips paths the store already knows,
//! drives the extractor for the rest, and upserts the results. Failure
//! isolation is per file; cancellation is cooperative; at most one scan runs
//! process-wide.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use slog::{debug, info, o, warn, Discard, Logger};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::Error;
use crate::extract::Extractor;
use crate::media::MediaRecord;
use crate::store::MediaStore;

pub use self::progress::{ScanProgress, ScanSummary};

mod progress;
#[cfg(test)]
mod tests;

/// Hard cap on parallel per-file work. Protects the store and filesystem
/// from thrashing under contention; requested concurrency never exceeds it.
pub const MAX_CONCURRENCY: usize = 3;

const BATCH_SIZE: usize = 50;
const PROGRESS_EVERY: usize = 5;
const BATCH_PAUSE: Duration = Duration::from_millis(25);

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wmv", "m4v", "mpg", "mpeg", "webm", "3gp", "mts", "m2ts",
];

pub type ProgressFn = Arc<dyn Fn(ScanProgress) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ScanOptions {
    /// Requested worker count; clamped to [`MAX_CONCURRENCY`].
    pub concurrency: Option<usize>,
    pub on_progress: Option<ProgressFn>,
}

/// How a `start_scan` call resolved.
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(ScanSummary),
    /// Another scan was already running; this request was ignored.
    AlreadyScanning,
}

pub struct MediaScanner {
    store: Arc<MediaStore>,
    extractor: Arc<dyn Extractor>,
    single_flight: SingleFlight,
    logger: Logger,
}

impl MediaScanner {
    pub fn new(store: Arc<MediaStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            store,
            extractor,
            single_flight: SingleFlight::default(),
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn is_scanning(&self) -> bool {
        self.single_flight.is_active()
    }

    /// Scan `folder` recursively, persisting metadata for files the store
    /// does not already know.
    ///
    /// A missing folder reports nothing; an empty one reports a single
    /// terminal `"No files found"` progress. The terminal summary is always
    /// emitted and the single-flight guard always released, whichever way the
    /// scan ends.
    pub async fn start_scan(
        &self,
        folder: &Path,
        options: ScanOptions,
        cancel: CancellationToken,
    ) -> Result<ScanOutcome, Error> {
        let Some(_guard) = self.single_flight.try_begin() else {
            info!(self.logger, "scan already in progress, ignoring request";
                "folder" => %folder.display());
            return Ok(ScanOutcome::AlreadyScanning);
        };

        let started = Instant::now();
        if !folder.is_dir() {
            debug!(self.logger, "scan folder does not exist"; "folder" => %folder.display());
            return Ok(ScanOutcome::Completed(ScanSummary::default()));
        }

        let files = discover_files(folder, &self.logger);
        if files.is_empty() {
            report(&options.on_progress, ScanProgress::new(0, 0, "No files found"));
            return Ok(ScanOutcome::Completed(ScanSummary::default()));
        }

        let total = files.len();
        let workers = options.concurrency.unwrap_or(MAX_CONCURRENCY).clamp(1, MAX_CONCURRENCY);
        let semaphore = Arc::new(Semaphore::new(workers));
        debug!(self.logger, "scan started";
            "folder" => %folder.display(), "files" => total, "workers" => workers);

        let mut summary = ScanSummary::default();
        let mut processed = 0usize;

        let batches = files.chunks(BATCH_SIZE).collect::<Vec<_>>();
        let batch_count = batches.len();
        for (batch_index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for path in batch {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("scan semaphore closed");
                let store = self.store.clone();
                let extractor = self.extractor.clone();
                let cancel = cancel.clone();
                let path = path.clone();
                handles.push(tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    process_file(&store, extractor.as_ref(), &path, &cancel)
                }));
            }

            for (handle, path) in handles.into_iter().zip(batch) {
                match handle.await {
                    Ok(Ok(FileProcessed::Added)) => {
                        processed += 1;
                        summary.added += 1;
                    }
                    Ok(Ok(FileProcessed::Skipped)) => {
                        processed += 1;
                        summary.skipped += 1;
                    }
                    // Cancelled mid-flight; not an error, not counted.
                    Ok(Err(Error::Cancelled)) => {
                        summary.cancelled = true;
                    }
                    Ok(Err(e)) => {
                        processed += 1;
                        summary.errors += 1;
                        warn!(self.logger, "failed to process file";
                            "path" => %path.display(), "error" => %e);
                    }
                    Err(e) => {
                        processed += 1;
                        summary.errors += 1;
                        warn!(self.logger, "scan worker panicked";
                            "path" => %path.display(), "error" => %e);
                    }
                }
                if processed % PROGRESS_EVERY == 0 && processed != total {
                    report(
                        &options.on_progress,
                        ScanProgress::new(processed, total, "Scanning"),
                    );
                }
            }

            // Yield between batches, then re-check cancellation before
            // starting the next one.
            if batch_index + 1 < batch_count {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }

        summary.elapsed = started.elapsed();
        report(
            &options.on_progress,
            ScanProgress::new(processed, total, summary.status_line()),
        );
        info!(self.logger, "scan finished";
            "added" => summary.added, "skipped" => summary.skipped,
            "errors" => summary.errors, "cancelled" => summary.cancelled);
        Ok(ScanOutcome::Completed(summary))
    }
}

enum FileProcessed {
    Added,
    Skipped,
}

fn process_file(
    store: &MediaStore,
    extractor: &dyn Extractor,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<FileProcessed, Error> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    if store.exists(path)? {
        return Ok(FileProcessed::Skipped);
    }
    let metadata = extractor.read(path)?;
    if cancel.is_cancelled() {
        // The upsert has not started; unwind instead of writing.
        return Err(Error::Cancelled);
    }
    store.upsert(&MediaRecord::from_metadata(path, metadata))?;
    Ok(FileProcessed::Added)
}

fn discover_files(folder: &Path, logger: &Logger) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder) {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_media_file(entry.path()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(logger, "skipping unreadable entry"; "error" => %e);
            }
        }
    }
    files
}

fn is_media_file(path: &Path) -> bool {
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let extension = extension.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&extension.as_str()) || VIDEO_EXTENSIONS.contains(&extension.as_str())
}

fn report(on_progress: &Option<ProgressFn>, progress: ScanProgress) {
    if let Some(on_progress) = on_progress {
        on_progress(progress);
    }
}

/// At most one scan runs at a time; the guard releases on every exit path.
#[derive(Default)]
struct SingleFlight {
    scanning: AtomicBool,
}

impl SingleFlight {
    fn try_begin(&self) -> Option<SingleFlightGuard<'_>> {
        self.scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SingleFlightGuard {
                flag: &self.scanning,
            })
    }

    fn is_active(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }
}

struct SingleFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
