//! Durable keyed repository for media metadata.
//!
//! One row per absolute path; repeated dimension text (timestamp source,
//! camera make, camera model) is normalized into lookup tables. Every
//! successful upsert broadcasts a [`CommitEvent`] to the current subscribers,
//! synchronously, after the transaction is durable.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use derive_more::{From, Into};
use rusqlite::Connection;
use slog::{debug, o, Discard, Logger};

use crate::error::Error;
use crate::media::MediaRecord;
use crate::retry::RetryPolicy;

use self::media_sql::MediaSql;

pub(crate) mod converters;
mod dimension_sql;
pub(crate) mod media_sql;

/// Emitted exactly once per successful upsert, after the write is durable.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub path: PathBuf,
}

/// Handle returned by [`MediaStore::subscribe`]; pass it back to
/// [`MediaStore::unsubscribe`] when done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From, Into)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&CommitEvent) + Send + Sync>;

pub struct MediaStore {
    conn: Mutex<Connection>,
    initialized: Mutex<bool>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    retry: RetryPolicy,
    logger: Logger,
}

impl MediaStore {
    pub fn new(path: &Path) -> Result<Self, Error> {
        let connection = Connection::open(path)?;
        Ok(Self::new_impl(connection))
    }

    pub fn new_in_memory() -> Result<Self, Error> {
        let connection = Connection::open_in_memory()?;
        Ok(Self::new_impl(connection))
    }

    fn new_impl(connection: Connection) -> Self {
        Self {
            conn: Mutex::new(connection),
            initialized: Mutex::new(false),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
            retry: RetryPolicy::default(),
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// True iff a record exists for `path`.
    pub fn exists(&self, path: &Path) -> Result<bool, Error> {
        validate_path(path)?;
        self.ensure_initialized()?;
        self.retry.run(|| {
            let conn = self.lock_conn();
            MediaSql::exists(&conn, &path.into())
        })
    }

    /// Insert or fully replace the record for its path, then notify every
    /// subscriber. Dimension values are resolved (get-or-create) and the fact
    /// row written in one transaction.
    pub fn upsert(&self, record: &MediaRecord) -> Result<(), Error> {
        validate_path(&record.path)?;
        self.ensure_initialized()?;
        self.retry.run(|| {
            let mut conn = self.lock_conn();
            let tx = conn.transaction()?;
            let source_id = dimension_sql::source_id(&tx, &record.taken_at_source)?;
            let make_id = dimension_sql::camera_make_id(&tx, &record.camera_make)?;
            let model_id = dimension_sql::camera_model_id(&tx, make_id, &record.camera_model)?;
            MediaSql::new(record, source_id, make_id, model_id).upsert(&tx)?;
            tx.commit()
        })?;
        debug!(self.logger, "committed"; "path" => %record.path.display());
        self.notify(&CommitEvent {
            path: record.path.clone(),
        });
        Ok(())
    }

    /// The record for `path`, or `None` if it was never scanned.
    pub fn get(&self, path: &Path) -> Result<Option<MediaRecord>, Error> {
        validate_path(path)?;
        self.ensure_initialized()?;
        let row = self.retry.run(|| {
            let conn = self.lock_conn();
            MediaSql::get(&conn, &path.into())
        })?;
        Ok(row.map(MediaRecord::from))
    }

    /// A finite snapshot of every record whose path starts with `folder`;
    /// order unspecified. Re-calling re-queries.
    pub fn get_all_under(&self, folder: &Path) -> Result<Vec<MediaRecord>, Error> {
        validate_path(folder)?;
        self.ensure_initialized()?;
        let prefix = folder
            .to_str()
            .ok_or_else(|| Error::Validation(folder.to_string_lossy().into_owned()))?;
        let rows = self.retry.run(|| {
            let conn = self.lock_conn();
            MediaSql::get_all_under(&conn, prefix)
        })?;
        Ok(rows.into_iter().map(MediaRecord::from).collect())
    }

    /// Register `handler` for commit notifications. The handler runs on the
    /// committing writer's thread and must not block; marshal slow work onto
    /// your own boundary. Each subscriber sees commits in commit order.
    pub fn subscribe(&self, handler: impl Fn(&CommitEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.lock_subscribers().push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscriber; unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock_subscribers().retain(|(sub_id, _)| *sub_id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn notify(&self, event: &CommitEvent) {
        // Snapshot the handlers so a callback can re-enter subscribe or
        // unsubscribe without deadlocking.
        let handlers: Vec<Subscriber> = self
            .lock_subscribers()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Schema and pragma setup, run exactly once on first use. Failure is
    /// fatal and not retried; later calls after success are no-ops.
    fn ensure_initialized(&self) -> Result<(), Error> {
        let mut initialized = self
            .initialized
            .lock()
            .expect("store init mutex poisoned");
        if *initialized {
            return Ok(());
        }
        let conn = self.lock_conn();
        for (pragma, value) in [
            ("journal_mode", "WAL"),
            ("synchronous", "NORMAL"),
            ("busy_timeout", "250"),
            ("foreign_keys", "ON"),
        ] {
            conn.pragma_update(None, pragma, value)
                .map_err(|e| Error::Initialization(e.to_string()))?;
        }
        MediaSql::create_tables(&conn).map_err(|e| Error::Initialization(e.to_string()))?;
        *initialized = true;
        debug!(self.logger, "store schema initialized");
        Ok(())
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store connection mutex poisoned")
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers
            .lock()
            .expect("store subscriber mutex poisoned")
    }
}

pub(crate) fn validate_path(path: &Path) -> Result<(), Error> {
    if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
        return Err(Error::Validation("path is empty".to_string()));
    }
    Ok(())
}
