//! End-to-end: scan a folder tree, persist metadata, and stream the results
//! to a consumer while commits are still arriving.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lightbox_lib::extract::{Extractor, MediaMetadata};
use lightbox_lib::feed::{FeedConfig, MediaFeed};
use lightbox_lib::media::Orientation;
use lightbox_lib::scanner::{MediaScanner, ScanOptions, ScanOutcome};
use lightbox_lib::store::MediaStore;
use lightbox_lib::Error;

struct StubExtractor;

impl Extractor for StubExtractor {
    fn read(&self, path: &Path) -> Result<MediaMetadata, Error> {
        if path.to_string_lossy().contains("broken") {
            return Err(Error::Extraction("unreadable".to_string()));
        }
        Ok(MediaMetadata {
            taken_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            taken_at_source: "Exif".to_string(),
            camera_make: "Fuji".to_string(),
            camera_model: "X100V".to_string(),
            orientation: Orientation::Normal,
            tags: vec!["scan".to_string()],
            thumbnail: Some(vec![0xFF, 0xD8]),
        })
    }
}

fn summary(outcome: ScanOutcome) -> lightbox_lib::scanner::ScanSummary {
    match outcome {
        ScanOutcome::Completed(summary) => summary,
        ScanOutcome::AlreadyScanning => panic!("expected a completed scan"),
    }
}

#[tokio::test]
async fn scan_results_stream_to_a_live_consumer() {
    let dir = tempfile::tempdir().expect("create tempdir");
    for i in 0..10 {
        fs::write(dir.path().join(format!("photo{i}.jpg")), b"bytes").expect("write");
    }
    fs::write(dir.path().join("broken.jpg"), b"bytes").expect("write");

    let store = Arc::new(MediaStore::new_in_memory().expect("open store"));
    let scanner = MediaScanner::new(store.clone(), Arc::new(StubExtractor));
    let feed = MediaFeed::with_config(
        store.clone(),
        FeedConfig {
            warmup_commit_threshold: 4,
            warmup_timeout: Duration::from_secs(30),
        },
    );

    // Consumer comes up before the scan; the snapshot is empty and every
    // delivery arrives through the commit pipeline.
    let (tx, mut rx) = mpsc::unbounded_channel();
    feed.start(dir.path(), tx).expect("start feed");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = scanner
        .start_scan(dir.path(), ScanOptions::default(), CancellationToken::new())
        .await
        .expect("scan");
    let summary = summary(outcome);
    assert_eq!(summary.added, 10);
    assert_eq!(summary.errors, 1);

    let mut delivered = Vec::new();
    while delivered.len() < 10 {
        let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for feed delivery")
            .expect("feed channel closed");
        delivered.push(record.path.clone());
    }
    delivered.sort();
    delivered.dedup();
    assert_eq!(delivered.len(), 10);
    assert!(delivered.iter().all(|p| p.starts_with(dir.path())));

    feed.stop();
    assert_eq!(store.subscriber_count(), 0);
}

#[tokio::test]
async fn rescanning_an_unchanged_tree_skips_everything() {
    let dir = tempfile::tempdir().expect("create tempdir");
    for i in 0..6 {
        fs::write(dir.path().join(format!("photo{i}.jpg")), b"bytes").expect("write");
    }

    let store = Arc::new(MediaStore::new_in_memory().expect("open store"));
    let scanner = MediaScanner::new(store.clone(), Arc::new(StubExtractor));

    let first = summary(
        scanner
            .start_scan(dir.path(), ScanOptions::default(), CancellationToken::new())
            .await
            .expect("first scan"),
    );
    assert_eq!(first.added, 6);

    let second = summary(
        scanner
            .start_scan(dir.path(), ScanOptions::default(), CancellationToken::new())
            .await
            .expect("second scan"),
    );
    assert_eq!(second.added, 0);
    assert_eq!(second.skipped, 6);
    assert_eq!(second.errors, 0);

    let records = store.get_all_under(dir.path()).expect("query");
    assert_eq!(records.len(), 6);
    let one = store
        .get(&PathBuf::from(dir.path().join("photo0.jpg")))
        .expect("get")
        .expect("present");
    assert_eq!(one.tags, vec!["scan"]);
}
