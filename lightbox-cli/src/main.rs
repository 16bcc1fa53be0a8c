use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lightbox_exif::ExifExtractor;
use lightbox_lib::feed::MediaFeed;
use lightbox_lib::scanner::{MediaScanner, ScanOptions, ScanOutcome, ScanProgress};
use lightbox_lib::store::MediaStore;
use lightbox_util::CanonicalizedPathBuf;
use sloggers::file::FileLoggerBuilder;
use sloggers::Build;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Index a folder tree of media files
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to directory with media contents
    #[arg(long)]
    media_path: CanonicalizedPathBuf,
    /// Path to the media db; defaults to the per-user data directory
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// Worker count for the scan (capped internally)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Print every indexed record under the media path after scanning
    #[arg(long)]
    list: bool,
    /// Keep running after the scan, printing records as they are indexed
    #[arg(long)]
    follow: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let db_path = match args.db_path {
        Some(path) => path,
        None => directories::ProjectDirs::from("", "", "lightbox")
            .context("no home directory for the default db path")?
            .data_dir()
            .join("lightbox.db"),
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // The log file lives alongside the store file.
    let log_path = db_path.with_extension("log");
    let logger = FileLoggerBuilder::new(&log_path).build()?;

    let store = Arc::new(MediaStore::new(&db_path)?.with_logger(logger.clone()));
    let extractor = Arc::new(ExifExtractor::new().with_logger(logger.clone()));
    let scanner = MediaScanner::new(store.clone(), extractor).with_logger(logger.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let feed = MediaFeed::new(store.clone()).with_logger(logger);
    let mut follow_rx = None;
    if args.follow {
        let (tx, rx) = mpsc::unbounded_channel();
        feed.start(args.media_path.as_path(), tx)?;
        follow_rx = Some(rx);
    }

    let options = ScanOptions {
        concurrency: args.concurrency,
        on_progress: Some(Arc::new(|progress: ScanProgress| {
            println!("[{:>5.1}%] {}", progress.percent(), progress.status);
        })),
    };
    let outcome = scanner
        .start_scan(args.media_path.as_path(), options, cancel.clone())
        .await?;
    if let ScanOutcome::Completed(summary) = outcome {
        println!("{}", summary.status_line());
    }

    if args.list {
        for record in store.get_all_under(args.media_path.as_path())? {
            println!(
                "{}\t{}\t{} {}",
                record.path.display(),
                record.taken_at,
                record.camera_make,
                record.camera_model
            );
        }
    }

    if let Some(mut rx) = follow_rx {
        println!("Following new records; press Ctrl-C to stop");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(record) => println!("{}", record.path.display()),
                    None => break,
                },
            }
        }
        feed.stop();
    }

    Ok(())
}
