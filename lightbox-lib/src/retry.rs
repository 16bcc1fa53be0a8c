//! Retry policy for transient storage contention.
//!
//! SQLite reports lock contention as `SQLITE_BUSY`/`SQLITE_LOCKED`; those are
//! the only errors worth retrying. Anything else propagates immediately.

use std::time::Duration;

use rusqlite::ErrorCode;

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying on transient contention up to `max_attempts` total
    /// attempts with a fixed `delay` between them.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Result<T, rusqlite::Error>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) if is_transient(&e) => {
                    return Err(Error::StorageContended {
                        attempts: self.max_attempts,
                        source: e,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

pub fn is_transient(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_error() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY), None)
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result = policy.run(|| {
            calls += 1;
            if calls < 3 {
                Err(busy_error())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn exhausts_budget_on_persistent_contention() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(busy_error())
        });
        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(Error::StorageContended { attempts: 3, .. })
        ));
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::Sqlite(_))));
    }
}
