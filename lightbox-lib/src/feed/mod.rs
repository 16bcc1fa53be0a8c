//! Streaming delivery of newly committed records to one display surface.
//!
//! For a single active folder scope the feed delivers an initial snapshot
//! from the store, gates the first burst of commit notifications, then
//! switches to low-latency incremental delivery, de-duplicating by path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lightbox_util::PathKey;
use slog::{debug, o, warn, Discard, Logger};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::media::MediaRecord;
use crate::store::{validate_path, MediaStore, SubscriptionId};


/// Warm-up gate tuning.
///
/// During a large scan, delivering one update per commit would flood the
/// consumer; the gate batches the initial burst and bounds worst-case latency
/// with the timeout. Both values are deliberately explicit configuration —
/// the right threshold depends on the display surface, so pick one rather
/// than relying on the default.
#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    /// Commit count that releases the gate.
    pub warmup_commit_threshold: usize,
    /// Wall-clock bound on the gate; fires even if the threshold is never
    /// reached.
    pub warmup_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            warmup_commit_threshold: 100,
            warmup_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    NotStarted,
    Loading,
    WarmingUp,
    Streaming,
    Stopped,
}

pub struct MediaFeed {
    store: Arc<MediaStore>,
    config: FeedConfig,
    state: Arc<Mutex<FeedState>>,
    session: Mutex<Option<FeedSession>>,
    logger: Logger,
}

struct FeedSession {
    cancel: CancellationToken,
    subscription: Arc<Mutex<Option<SubscriptionId>>>,
    task: JoinHandle<()>,
}

impl MediaFeed {
    pub fn new(store: Arc<MediaStore>) -> Self {
        Self::with_config(store, FeedConfig::default())
    }

    pub fn with_config(store: Arc<MediaStore>, config: FeedConfig) -> Self {
        Self {
            store,
            config,
            state: Arc::new(Mutex::new(FeedState::NotStarted)),
            session: Mutex::new(None),
            logger: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> FeedState {
        *self.state.lock().expect("feed state mutex poisoned")
    }

    /// Begin delivering records under `folder` into `sink`.
    ///
    /// Any previous scope is stopped first, discarding its de-dup state and
    /// dropping its store subscription. Must be called from within a Tokio
    /// runtime.
    pub fn start(
        &self,
        folder: &Path,
        sink: mpsc::UnboundedSender<MediaRecord>,
    ) -> Result<(), Error> {
        validate_path(folder)?;
        self.stop();
        *self.state.lock().expect("feed state mutex poisoned") = FeedState::NotStarted;

        let cancel = CancellationToken::new();
        let subscription = Arc::new(Mutex::new(None));
        let task = tokio::spawn(run_session(SessionContext {
            store: self.store.clone(),
            config: self.config,
            folder: folder.to_path_buf(),
            sink,
            cancel: cancel.clone(),
            subscription: subscription.clone(),
            state: self.state.clone(),
            logger: self.logger.clone(),
        }));
        *self.session.lock().expect("feed session mutex poisoned") = Some(FeedSession {
            cancel,
            subscription,
            task,
        });
        Ok(())
    }

    /// Unsubscribe and halt delivery. Idempotent; safe when already stopped.
    pub fn stop(&self) {
        let session = self
            .session
            .lock()
            .expect("feed session mutex poisoned")
            .take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Some(id) = session
                .subscription
                .lock()
                .expect("feed subscription mutex poisoned")
                .take()
            {
                self.store.unsubscribe(id);
            }
            session.task.abort();
        }
        *self.state.lock().expect("feed state mutex poisoned") = FeedState::Stopped;
    }
}

impl Drop for MediaFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SessionContext {
    store: Arc<MediaStore>,
    config: FeedConfig,
    folder: PathBuf,
    sink: mpsc::UnboundedSender<MediaRecord>,
    cancel: CancellationToken,
    subscription: Arc<Mutex<Option<SubscriptionId>>>,
    state: Arc<Mutex<FeedState>>,
    logger: Logger,
}

impl SessionContext {
    fn set_state(&self, state: FeedState) {
        *self.state.lock().expect("feed state mutex poisoned") = state;
    }

    fn scope(&self) -> String {
        self.folder.to_string_lossy().into_owned()
    }

    fn release_subscription(&self) {
        if let Some(id) = self
            .subscription
            .lock()
            .expect("feed subscription mutex poisoned")
            .take()
        {
            self.store.unsubscribe(id);
        }
    }
}

async fn run_session(ctx: SessionContext) {
    let scope = ctx.scope();
    let mut delivered: HashSet<PathKey> = HashSet::new();

    // Loading: one snapshot of everything already persisted for the scope.
    // Store calls block (rusqlite plus retry sleeps), so they run off the
    // runtime worker.
    ctx.set_state(FeedState::Loading);
    let snapshot = {
        let store = ctx.store.clone();
        let folder = ctx.folder.clone();
        tokio::task::spawn_blocking(move || store.get_all_under(&folder)).await
    };
    match snapshot {
        Ok(Ok(records)) => {
            for record in records.into_iter().filter(MediaRecord::has_thumbnail) {
                if ctx.cancel.is_cancelled() {
                    ctx.set_state(FeedState::Stopped);
                    return;
                }
                let key = PathKey::from(record.path.as_path());
                if delivered.insert(key) && ctx.sink.send(record).is_err() {
                    ctx.set_state(FeedState::Stopped);
                    return;
                }
            }
        }
        Ok(Err(e)) => {
            warn!(ctx.logger, "initial feed load failed";
                "folder" => %ctx.folder.display(), "error" => %e);
        }
        Err(e) => {
            warn!(ctx.logger, "feed load worker panicked";
                "folder" => %ctx.folder.display(), "error" => %e);
        }
    }

    // WarmingUp: subscribe and buffer the first burst of commits.
    let (commit_tx, mut commit_rx) = mpsc::unbounded_channel::<PathBuf>();
    let id = ctx.store.subscribe(move |event| {
        // Runs on the committing writer's thread; an unbounded send never
        // blocks it.
        let _ = commit_tx.send(event.path.clone());
    });
    *ctx.subscription
        .lock()
        .expect("feed subscription mutex poisoned") = Some(id);
    if ctx.cancel.is_cancelled() {
        ctx.release_subscription();
        ctx.set_state(FeedState::Stopped);
        return;
    }
    ctx.set_state(FeedState::WarmingUp);

    let deadline = Instant::now() + ctx.config.warmup_timeout;
    let mut pending: Vec<PathBuf> = Vec::new();
    while pending.len() < ctx.config.warmup_commit_threshold {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                ctx.release_subscription();
                ctx.set_state(FeedState::Stopped);
                return;
            }
            _ = tokio::time::sleep_until(deadline) => break,
            received = commit_rx.recv() => match received {
                Some(path) => pending.push(path),
                None => break,
            },
        }
    }
    debug!(ctx.logger, "warm-up gate released";
        "folder" => %ctx.folder.display(), "buffered" => pending.len());

    // Streaming: drain the buffered burst, then deliver per commit.
    ctx.set_state(FeedState::Streaming);
    for path in pending.drain(..) {
        deliver_commit(&ctx, &scope, &mut delivered, path).await;
    }
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            received = commit_rx.recv() => match received {
                Some(path) => deliver_commit(&ctx, &scope, &mut delivered, path).await,
                None => break,
            },
        }
    }
    ctx.release_subscription();
    ctx.set_state(FeedState::Stopped);
}

/// Deliver one committed path if it is in scope, unseen, and carries a
/// thumbnail. A failed fetch degrades to "item not shown". The store fetch
/// blocks, so it runs off the runtime worker.
async fn deliver_commit(
    ctx: &SessionContext,
    scope: &str,
    delivered: &mut HashSet<PathKey>,
    path: PathBuf,
) {
    if !path.to_string_lossy().starts_with(scope) {
        return;
    }
    let key = PathKey::from(path.as_path());
    if delivered.contains(&key) {
        return;
    }
    let fetched = {
        let store = ctx.store.clone();
        let path = path.clone();
        tokio::task::spawn_blocking(move || store.get(&path)).await
    };
    match fetched {
        Ok(Ok(Some(record))) if record.has_thumbnail() => {
            delivered.insert(key);
            let _ = ctx.sink.send(record);
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            warn!(ctx.logger, "failed to fetch committed record";
                "path" => %path.display(), "error" => %e);
        }
        Err(e) => {
            warn!(ctx.logger, "feed fetch worker panicked";
                "path" => %path.display(), "error" => %e);
        }
    }
}
