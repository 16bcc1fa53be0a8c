use std::time::Duration;

use serde::Serialize;

/// Throttled progress report for one running scan. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub status: String,
}

impl ScanProgress {
    pub fn new(processed: usize, total: usize, status: impl Into<String>) -> Self {
        Self {
            processed,
            total,
            status: status.into(),
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Terminal accounting for one scan, regardless of how it ended.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub added: usize,
    pub skipped: usize,
    pub errors: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl ScanSummary {
    pub fn status_line(&self) -> String {
        let verdict = if self.cancelled {
            "Scan cancelled"
        } else {
            "Scan complete"
        };
        format!(
            "{}: {} added, {} skipped, {} errors in {:.1?}",
            verdict, self.added, self.skipped, self.errors, self.elapsed
        )
    }
}
