use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::extract::{Extractor, MediaMetadata};
use crate::media::Orientation;
use crate::scanner::{MediaScanner, ScanOptions, ScanOutcome, ScanProgress};
use crate::store::MediaStore;
use crate::Error;

#[derive(Default)]
struct FakeExtractor {
    fail_for: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Extractor for FakeExtractor {
    fn read(&self, path: &Path) -> Result<MediaMetadata, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(needle) = &self.fail_for {
            if path.to_string_lossy().contains(needle.as_str()) {
                return Err(Error::Extraction("corrupt header".to_string()));
            }
        }
        Ok(MediaMetadata {
            taken_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            taken_at_source: "Exif".to_string(),
            camera_make: "Canon".to_string(),
            camera_model: "EOS 40D".to_string(),
            orientation: Orientation::Normal,
            tags: vec![],
            thumbnail: Some(vec![1, 2, 3]),
        })
    }
}

fn media_tree(count: usize) -> TempDir {
    let dir = tempfile::tempdir().expect("create tempdir");
    for i in 0..count {
        fs::write(dir.path().join(format!("img{i:02}.jpg")), b"fake image").expect("write file");
    }
    dir
}

fn capture_progress() -> (ScanOptions, Arc<Mutex<Vec<ScanProgress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let options = ScanOptions {
        concurrency: None,
        on_progress: Some(Arc::new(move |p| sink.lock().unwrap().push(p))),
    };
    (options, events)
}

fn scanner_with(extractor: FakeExtractor) -> (Arc<MediaStore>, MediaScanner) {
    let store = Arc::new(MediaStore::new_in_memory().expect("open store"));
    let scanner = MediaScanner::new(store.clone(), Arc::new(extractor));
    (store, scanner)
}

fn summary(outcome: ScanOutcome) -> crate::scanner::ScanSummary {
    match outcome {
        ScanOutcome::Completed(summary) => summary,
        ScanOutcome::AlreadyScanning => panic!("expected a completed scan"),
    }
}

#[tokio::test]
async fn missing_folder_reports_nothing() {
    let (_store, scanner) = scanner_with(FakeExtractor::default());
    let (options, events) = capture_progress();
    let outcome = scanner
        .start_scan(Path::new("/does/not/exist"), options, CancellationToken::new())
        .await
        .expect("scan");
    let summary = summary(outcome);
    assert_eq!(summary.added, 0);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_folder_reports_no_files_found() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let (_store, scanner) = scanner_with(FakeExtractor::default());
    let (options, events) = capture_progress();
    scanner
        .start_scan(dir.path(), options, CancellationToken::new())
        .await
        .expect("scan");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].processed, 0);
    assert_eq!(events[0].total, 0);
    assert_eq!(events[0].status, "No files found");
}

#[tokio::test]
async fn scan_persists_discovered_files() {
    let dir = media_tree(10);
    fs::write(dir.path().join("notes.txt"), b"not media").expect("write file");
    let (store, scanner) = scanner_with(FakeExtractor::default());
    let outcome = scanner
        .start_scan(dir.path(), ScanOptions::default(), CancellationToken::new())
        .await
        .expect("scan");

    let summary = summary(outcome);
    assert_eq!(summary.added, 10);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.errors, 0);
    assert!(!summary.cancelled);
    assert_eq!(store.get_all_under(dir.path()).expect("query").len(), 10);
}

#[tokio::test]
async fn second_scan_skips_known_files() {
    let dir = media_tree(8);
    let (store, scanner) = scanner_with(FakeExtractor::default());
    scanner
        .start_scan(dir.path(), ScanOptions::default(), CancellationToken::new())
        .await
        .expect("first scan");
    let outcome = scanner
        .start_scan(dir.path(), ScanOptions::default(), CancellationToken::new())
        .await
        .expect("second scan");

    let summary = summary(outcome);
    assert_eq!(summary.added, 0);
    assert_eq!(summary.skipped, 8);
    assert_eq!(summary.errors, 0);
    assert_eq!(store.get_all_under(dir.path()).expect("query").len(), 8);
}

#[tokio::test]
async fn extraction_failure_does_not_abort_the_scan() {
    let dir = media_tree(10);
    let (store, scanner) = scanner_with(FakeExtractor {
        fail_for: Some("img03".to_string()),
        ..Default::default()
    });
    let outcome = scanner
        .start_scan(dir.path(), ScanOptions::default(), CancellationToken::new())
        .await
        .expect("scan");

    let summary = summary(outcome);
    assert_eq!(summary.added, 9);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(store.get_all_under(dir.path()).expect("query").len(), 9);
}

#[tokio::test]
async fn pre_cancelled_scan_writes_nothing() {
    let dir = media_tree(5);
    let (store, scanner) = scanner_with(FakeExtractor::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = scanner
        .start_scan(dir.path(), ScanOptions::default(), cancel)
        .await
        .expect("scan");

    let summary = summary(outcome);
    assert!(summary.cancelled);
    assert_eq!(summary.added, 0);
    assert_eq!(summary.errors, 0);
    assert!(store.get_all_under(dir.path()).expect("query").is_empty());
}

#[tokio::test]
async fn progress_fires_every_fifth_file_and_at_the_end() {
    let dir = media_tree(12);
    let (_store, scanner) = scanner_with(FakeExtractor::default());
    let (options, events) = capture_progress();
    scanner
        .start_scan(dir.path(), options, CancellationToken::new())
        .await
        .expect("scan");

    let events = events.lock().unwrap();
    let counts: Vec<usize> = events.iter().map(|p| p.processed).collect();
    assert_eq!(counts, vec![5, 10, 12]);
    let terminal = events.last().expect("terminal event");
    assert!(terminal.is_complete());
    assert!(terminal.status.contains("12 added"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_one_scan_runs_at_a_time() {
    let dir = media_tree(6);
    let store = Arc::new(MediaStore::new_in_memory().expect("open store"));
    let scanner = Arc::new(MediaScanner::new(
        store.clone(),
        Arc::new(FakeExtractor {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        }),
    ));

    let folder = PathBuf::from(dir.path());
    let first = {
        let scanner = scanner.clone();
        let folder = folder.clone();
        tokio::spawn(async move {
            scanner
                .start_scan(&folder, ScanOptions::default(), CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(scanner.is_scanning());

    let second = scanner
        .start_scan(&folder, ScanOptions::default(), CancellationToken::new())
        .await
        .expect("second call");
    assert!(matches!(second, ScanOutcome::AlreadyScanning));

    let first = summary(first.await.expect("join").expect("first scan"));
    assert_eq!(first.added, 6);
    assert!(!scanner.is_scanning());
    // No duplicate upserts from the rejected request.
    assert_eq!(store.get_all_under(&folder).expect("query").len(), 6);
}
