//! Watch coordinator.
//!
//! Owns the filesystem subscription, runs the startup sweep, and routes
//! every in-scope change to a pipeline worker. Events for one path always
//! go to the same worker, so a file's cursor is never read concurrently.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use notify::ErrorKind;
use notify_debouncer_full::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::error::WatcherError;
use super::event::{FileEvent, FileEventKind};
use super::matcher::{watch_targets, PatternMatcher, WatchTarget};
use super::offset::{Discovery, OffsetTracker};
use crate::config::WatchConfig;
use crate::pipeline::Pipeline;

/// Queue depth per worker before dispatch waits.
const WORKER_QUEUE: usize = 256;

/// Lifecycle of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    /// Reading pre-existing matching files from the start.
    Scanning,
    /// Subscribed and processing change events.
    Watching,
    Stopped,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Watching => "watching",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Coordinator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub startup_scan: bool,
    pub workers: usize,
    pub debounce: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

impl CoordinatorOptions {
    #[must_use]
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            startup_scan: config.startup_scan,
            workers: config.workers.max(1),
            debounce: config.debounce(),
        }
    }
}

/// Work for a pipeline worker.
#[derive(Debug)]
enum Job {
    Read {
        path: PathBuf,
        discovery: Discovery,
        done: Option<oneshot::Sender<()>>,
    },
    Forget(PathBuf),
    /// Re-key the cursor, then read the destination.
    Rename {
        from: PathBuf,
        to: PathBuf,
    },
}

/// Drives the watch scope through the pipeline until shutdown.
#[derive(Debug)]
pub struct WatchCoordinator {
    matcher: Arc<PatternMatcher>,
    tracker: Arc<OffsetTracker>,
    pipeline: Arc<Pipeline>,
    options: CoordinatorOptions,
    state: watch::Sender<CoordinatorState>,
    shutdown: CancellationToken,
}

impl WatchCoordinator {
    #[must_use]
    pub fn new(matcher: PatternMatcher, pipeline: Pipeline, options: CoordinatorOptions) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        Self {
            matcher: Arc::new(matcher),
            tracker: Arc::new(OffsetTracker::new()),
            pipeline: Arc::new(pipeline),
            options,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build a coordinator for the configured watch scope.
    ///
    /// Watch roots are canonicalized so they compare equal to the paths the
    /// watch facility reports.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::MissingRoot`] for a root that cannot be
    /// resolved and [`WatcherError::InvalidPattern`] for a bad glob.
    pub fn from_config(config: &WatchConfig, pipeline: Pipeline) -> Result<Self, WatcherError> {
        let targets = watch_targets(config)
            .into_iter()
            .map(|target| {
                let directory = std::fs::canonicalize(&target.directory)
                    .map_err(|_| WatcherError::MissingRoot(target.directory.clone()))?;
                Ok(WatchTarget::new(directory, target.recursive))
            })
            .collect::<Result<Vec<_>, WatcherError>>()?;
        let matcher = PatternMatcher::new(targets, &config.extensions, &config.patterns)?;
        Ok(Self::new(matcher, pipeline, CoordinatorOptions::from_config(config)))
    }

    /// Use `token` as the shutdown signal.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Token that stops the coordinator when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Receive every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<OffsetTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    #[must_use]
    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Subscribe to the watch roots and run until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the watch facility cannot be initialized, if it
    /// fails while running, or if a watch root disappears.
    pub async fn run(&self) -> Result<(), WatcherError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (failed, failures) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(self.options.debounce, None, move |result: DebounceEventResult| {
            // A closed channel means the coordinator is stopping
            match result {
                Ok(events) => {
                    for event in events.iter().flat_map(|e| FileEvent::from_notify(&e.event)) {
                        let _ = tx.send(event);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        if is_fatal(&error) {
                            let _ = failed.send(WatcherError::Notify(error));
                        } else {
                            tracing::warn!(error = %error, "File watcher reported an error");
                        }
                    }
                }
            }
        })?;

        for target in self.matcher.targets() {
            let mode = if target.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            debouncer.watch(&target.directory, mode)?;
            tracing::info!(
                directory = %target.directory.display(),
                recursive = target.recursive,
                "Watching directory"
            );
        }

        let result = self.run_with_subscription(rx, failures).await;
        drop(debouncer);
        result
    }

    /// Run the coordinator on an already established event stream.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::SubscriptionClosed`] if `events` ends before
    /// shutdown is requested, and [`WatcherError::RootRemoved`] if a watch
    /// root disappears.
    pub async fn run_with_events(
        &self,
        events: mpsc::UnboundedReceiver<FileEvent>,
    ) -> Result<(), WatcherError> {
        self.drive(events, None).await
    }

    /// Like [`run_with_events`](Self::run_with_events), also stopping on the
    /// first error received from `failures`.
    ///
    /// # Errors
    ///
    /// Returns the first watch facility failure, or the errors of
    /// [`run_with_events`](Self::run_with_events).
    pub async fn run_with_subscription(
        &self,
        events: mpsc::UnboundedReceiver<FileEvent>,
        failures: mpsc::UnboundedReceiver<WatcherError>,
    ) -> Result<(), WatcherError> {
        self.drive(events, Some(failures)).await
    }

    async fn drive(
        &self,
        mut events: mpsc::UnboundedReceiver<FileEvent>,
        mut failures: Option<mpsc::UnboundedReceiver<WatcherError>>,
    ) -> Result<(), WatcherError> {
        self.transition(CoordinatorState::Scanning);

        let mut workers = JoinSet::new();
        let senders: Vec<mpsc::Sender<Job>> = (0..self.options.workers)
            .map(|id| {
                let (tx, rx) = mpsc::channel(WORKER_QUEUE);
                workers.spawn(worker(
                    id,
                    rx,
                    Arc::clone(&self.tracker),
                    Arc::clone(&self.pipeline),
                    self.shutdown.clone(),
                ));
                tx
            })
            .collect();

        if self.options.startup_scan {
            self.startup_scan(&senders).await;
        }

        let result = if self.shutdown.is_cancelled() {
            Ok(())
        } else {
            self.transition(CoordinatorState::Watching);
            self.watch_loop(&mut events, &mut failures, &senders).await
        };

        drop(senders);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Pipeline worker panicked");
            }
        }

        self.transition(CoordinatorState::Stopped);
        result
    }

    async fn watch_loop(
        &self,
        events: &mut mpsc::UnboundedReceiver<FileEvent>,
        failures: &mut Option<mpsc::UnboundedReceiver<WatcherError>>,
        senders: &[mpsc::Sender<Job>],
    ) -> Result<(), WatcherError> {
        let failure = loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping watcher");
                    return Ok(());
                }
                error = next_failure(failures.as_mut()) => break error,
                event = events.recv() => {
                    let Some(event) = event else {
                        break WatcherError::SubscriptionClosed;
                    };
                    if let Some(root) = self.removed_root(&event) {
                        break WatcherError::RootRemoved(root);
                    }
                    self.route(event, senders).await;
                }
            }
        };

        tracing::error!(error = %failure, "File watcher failed");
        self.shutdown.cancel();
        Err(failure)
    }

    /// A watch root that no longer exists, checked when `event` removes or
    /// moves something.
    fn removed_root(&self, event: &FileEvent) -> Option<PathBuf> {
        if matches!(event.kind, FileEventKind::Created | FileEventKind::Modified) {
            return None;
        }
        self.matcher
            .targets()
            .iter()
            .find(|target| !target.directory.is_dir())
            .map(|target| target.directory.clone())
    }

    /// Sweep the watch roots and read every matching file from the start.
    async fn startup_scan(&self, senders: &[mpsc::Sender<Job>]) {
        let matcher = Arc::clone(&self.matcher);
        let files = match tokio::task::spawn_blocking(move || scan_targets(&matcher)).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "Startup scan failed");
                return;
            }
        };
        tracing::info!(files = files.len(), "Scanning existing files");

        let mut pending = Vec::with_capacity(files.len());
        for path in files {
            let (done, finished) = oneshot::channel();
            let job = Job::Read {
                path: path.clone(),
                discovery: Discovery::Scan,
                done: Some(done),
            };
            if dispatch(senders, &path, job).await {
                pending.push(finished);
            }
        }

        tokio::select! {
            () = self.shutdown.cancelled() => {
                tracing::info!("Shutdown requested during startup scan");
            }
            _ = join_all(pending) => {
                tracing::info!("Startup scan complete");
            }
        }
    }

    /// Turn one filesystem event into worker jobs.
    async fn route(&self, event: FileEvent, senders: &[mpsc::Sender<Job>]) {
        let FileEvent { path, kind } = event;
        match kind {
            FileEventKind::Created | FileEventKind::Modified => {
                if !self.matcher.matches(&path) {
                    return;
                }
                let discovery = if kind == FileEventKind::Created {
                    Discovery::Created
                } else {
                    Discovery::Modified
                };
                let job = Job::Read {
                    path: path.clone(),
                    discovery,
                    done: None,
                };
                dispatch(senders, &path, job).await;
            }
            FileEventKind::Deleted => {
                dispatch(senders, &path, Job::Forget(path.clone())).await;
            }
            FileEventKind::Moved { to: Some(to) } if self.matcher.matches(&to) => {
                let rename = Job::Rename {
                    from: path,
                    to: to.clone(),
                };
                dispatch(senders, &to, rename).await;
            }
            FileEventKind::Moved { .. } => {
                dispatch(senders, &path, Job::Forget(path.clone())).await;
            }
        }
    }

    fn transition(&self, next: CoordinatorState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Coordinator state changed");
        }
    }
}

/// Index of the worker that owns `path`.
fn worker_for(path: &Path, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    let workers = u64::try_from(workers.max(1)).unwrap_or(1);
    usize::try_from(hasher.finish() % workers).unwrap_or(0)
}

/// Backend errors after which no further events can be trusted to arrive.
fn is_fatal(error: &notify::Error) -> bool {
    !matches!(error.kind, ErrorKind::PathNotFound | ErrorKind::WatchNotFound)
}

/// Next failure from the watch facility. Never resolves without a
/// failure channel.
async fn next_failure(failures: Option<&mut mpsc::UnboundedReceiver<WatcherError>>) -> WatcherError {
    match failures {
        Some(failures) => failures.recv().await.unwrap_or(WatcherError::SubscriptionClosed),
        None => std::future::pending().await,
    }
}

/// Send `job` to the worker owning `path`. Returns `false` if that worker
/// has stopped.
async fn dispatch(senders: &[mpsc::Sender<Job>], path: &Path, job: Job) -> bool {
    let Some(sender) = senders.get(worker_for(path, senders.len())) else {
        return false;
    };
    sender.send(job).await.is_ok()
}

/// Matching files under every target, sorted and without duplicates.
fn scan_targets(matcher: &PatternMatcher) -> Vec<PathBuf> {
    let mut files = BTreeSet::new();
    for target in matcher.targets() {
        let mut walk = WalkDir::new(&target.directory).min_depth(1);
        if !target.recursive {
            walk = walk.max_depth(1);
        }
        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && matcher.matches(entry.path()) {
                files.insert(entry.into_path());
            }
        }
    }
    files.into_iter().collect()
}

async fn worker(
    id: usize,
    mut jobs: mpsc::Receiver<Job>,
    tracker: Arc<OffsetTracker>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
) {
    tracing::trace!(worker = id, "Pipeline worker started");
    loop {
        let job = tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match job {
            Job::Read {
                path,
                discovery,
                done,
            } => {
                read(&tracker, &pipeline, &path, discovery).await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Job::Forget(path) => {
                tracker.forget(&path).await;
            }
            Job::Rename { from, to } => {
                // A file moved in from outside the tracker is new to the scope
                let discovery = if tracker.rename(&from, &to).await {
                    tracing::debug!(from = %from.display(), to = %to.display(), "File renamed");
                    Discovery::Modified
                } else {
                    Discovery::Created
                };
                read(&tracker, &pipeline, &to, discovery).await;
            }
        }
    }
    tracing::trace!(worker = id, "Pipeline worker stopped");
}

async fn read(tracker: &OffsetTracker, pipeline: &Pipeline, path: &Path, discovery: Discovery) {
    if let Some(content) = tracker.on_event(path, discovery).await {
        pipeline.process(&content).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::SeenSet;
    use crate::extract::UrlExtractor;
    use crate::notifier::{Notifier, RetryPolicy};
    use crate::shortener::ShortenerChain;
    use std::io::Write;
    use tempfile::TempDir;

    fn offline_pipeline() -> Pipeline {
        Pipeline::new(
            UrlExtractor::new(),
            Arc::new(SeenSet::new()),
            ShortenerChain::new(Vec::new()),
            Notifier::new(reqwest::Client::new(), Vec::new(), RetryPolicy::default()),
        )
    }

    fn coordinator(dir: &TempDir, startup_scan: bool) -> WatchCoordinator {
        coordinator_at(&std::fs::canonicalize(dir.path()).unwrap(), startup_scan)
    }

    fn coordinator_at(root: &Path, startup_scan: bool) -> WatchCoordinator {
        let matcher = PatternMatcher::new(
            vec![WatchTarget::new(root, true)],
            [".log"],
            ["*tunnel*"],
        )
        .unwrap();
        let options = CoordinatorOptions {
            startup_scan,
            workers: 2,
            debounce: Duration::from_millis(10),
        };
        WatchCoordinator::new(matcher, offline_pipeline(), options)
    }

    #[test]
    fn test_worker_for_is_stable() {
        let path = Path::new("/logs/tunnel.log");
        assert_eq!(worker_for(path, 4), worker_for(path, 4));
        assert!(worker_for(path, 4) < 4);
        assert_eq!(worker_for(path, 0), 0);
    }

    #[test]
    fn test_scan_targets_respects_scope() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(root.join("nested")).unwrap();
        std::fs::write(root.join("tunnel.log"), "x").unwrap();
        std::fs::write(root.join("nested/tunnel-2.log"), "x").unwrap();
        std::fs::write(root.join("app.log"), "x").unwrap();
        std::fs::write(root.join("tunnel.json"), "x").unwrap();

        let flat = PatternMatcher::new(vec![WatchTarget::new(&root, false)], ["log"], ["*tunnel*"])
            .unwrap();
        assert_eq!(scan_targets(&flat), vec![root.join("tunnel.log")]);

        let deep = PatternMatcher::new(vec![WatchTarget::new(&root, true)], ["log"], ["*tunnel*"])
            .unwrap();
        assert_eq!(
            scan_targets(&deep),
            vec![root.join("nested/tunnel-2.log"), root.join("tunnel.log")]
        );
    }

    #[tokio::test]
    async fn test_startup_scan_reads_whole_file() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(
            root.join("tunnel.log"),
            "Your tunnel URL is https://abc123.trycloudflare.com\n",
        )
        .unwrap();

        let coordinator = coordinator(&dir, true);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);

        // Closed stream after the scan is a subscription failure
        let result = coordinator.run_with_events(rx).await;
        assert!(matches!(result, Err(WatcherError::SubscriptionClosed)));
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);

        let stats = coordinator.pipeline().stats();
        assert_eq!(stats.candidates, 1);
        assert_eq!(coordinator.pipeline().seen().len(), 1);
    }

    #[tokio::test]
    async fn test_modified_pre_existing_file_reads_only_appends() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let path = root.join("cloudflared-tunnel.log");
        std::fs::write(&path, "old: https://old.trycloudflare.com\n").unwrap();

        let coordinator = Arc::new(coordinator(&dir, false));
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run_with_events(rx).await })
        };

        // First sighting establishes the cursor at the current size
        tx.send(FileEvent::modified(&path)).unwrap();
        wait_for_cursor(&coordinator, &path).await;

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "new: https://new.trycloudflare.com").unwrap();
        drop(file);
        tx.send(FileEvent::modified(&path)).unwrap();

        wait_for(|| coordinator.pipeline().stats().candidates == 1).await;
        coordinator.shutdown_token().cancel();
        runner.await.unwrap().unwrap();

        assert_eq!(coordinator.pipeline().seen().len(), 1);
        assert!(!coordinator.pipeline().seen().is_novel("https://new.trycloudflare.com"));
        assert!(coordinator.pipeline().seen().is_novel("https://old.trycloudflare.com"));
    }

    #[tokio::test]
    async fn test_delete_evicts_cursor() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let path = root.join("tunnel.log");
        std::fs::write(&path, "nothing yet\n").unwrap();

        let coordinator = Arc::new(coordinator(&dir, false));
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run_with_events(rx).await })
        };

        tx.send(FileEvent::created(&path)).unwrap();
        wait_for_cursor(&coordinator, &path).await;

        std::fs::remove_file(&path).unwrap();
        tx.send(FileEvent::deleted(&path)).unwrap();
        let tracker = Arc::clone(coordinator.tracker());
        for _ in 0..200 {
            if tracker.cursor(&path).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(tracker.is_empty().await);

        coordinator.shutdown_token().cancel();
        runner.await.unwrap().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
    }

    #[tokio::test]
    async fn test_out_of_scope_events_are_ignored() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let path = root.join("app.log");
        std::fs::write(&path, "tunnel https://abc.trycloudflare.com\n").unwrap();

        let coordinator = coordinator(&dir, false);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FileEvent::created(&path)).unwrap();
        drop(tx);

        let result = coordinator.run_with_events(rx).await;
        assert!(matches!(result, Err(WatcherError::SubscriptionClosed)));
        assert!(coordinator.tracker().is_empty().await);
        assert_eq!(coordinator.pipeline().stats().blocks, 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, true);
        let mut states = coordinator.subscribe();
        coordinator.shutdown_token().cancel();

        let (_tx, rx) = mpsc::unbounded_channel();
        coordinator.run_with_events(rx).await.unwrap();
        assert_eq!(*states.borrow_and_update(), CoordinatorState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_moved_over_tracked_log_is_read_from_start() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let log = root.join("tunnel.log");
        let tmp = root.join("tunnel.tmp");
        std::fs::write(&log, "starting\n").unwrap();

        let coordinator = Arc::new(coordinator(&dir, true));
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run_with_events(rx).await })
        };
        wait_for_cursor(&coordinator, &log).await;

        std::fs::write(&tmp, "Your tunnel URL is https://rotated.trycloudflare.com\n").unwrap();
        std::fs::rename(&tmp, &log).unwrap();
        tx.send(FileEvent::moved(&tmp, Some(log.clone()))).unwrap();

        wait_for(|| coordinator.pipeline().stats().candidates == 1).await;
        assert!(!coordinator
            .pipeline()
            .seen()
            .is_novel("https://rotated.trycloudflare.com"));

        coordinator.shutdown_token().cancel();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_file_moved_into_scope_is_read_from_start() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let staged = root.join("staging.txt");
        let log = root.join("tunnel.log");

        let coordinator = Arc::new(coordinator(&dir, false));
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run_with_events(rx).await })
        };

        std::fs::write(&staged, "Your tunnel URL is https://moved.trycloudflare.com\n").unwrap();
        std::fs::rename(&staged, &log).unwrap();
        tx.send(FileEvent::moved(&staged, Some(log.clone()))).unwrap();

        wait_for(|| coordinator.pipeline().stats().candidates == 1).await;
        coordinator.shutdown_token().cancel();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_watch_failure_stops_coordinator() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, false);
        let (_tx, events) = mpsc::unbounded_channel();
        let (failed, failures) = mpsc::unbounded_channel();
        failed
            .send(WatcherError::Notify(notify::Error::generic("inotify read failed")))
            .unwrap();

        let result = coordinator.run_with_subscription(events, failures).await;
        assert!(matches!(result, Err(WatcherError::Notify(_))));
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert!(coordinator.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_removed_root_stops_coordinator() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap().join("logs");
        std::fs::create_dir(&root).unwrap();

        let coordinator = coordinator_at(&root, false);
        let (tx, rx) = mpsc::unbounded_channel();
        std::fs::remove_dir(&root).unwrap();
        tx.send(FileEvent::deleted(&root)).unwrap();

        let result = coordinator.run_with_events(rx).await;
        assert!(matches!(result, Err(WatcherError::RootRemoved(path)) if path == root));
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
    }

    #[test]
    fn test_fatal_backend_errors() {
        assert!(is_fatal(&notify::Error::generic("backend died")));
        assert!(is_fatal(&notify::Error::new(ErrorKind::MaxFilesWatch)));
        assert!(!is_fatal(&notify::Error::path_not_found()));
        assert!(!is_fatal(&notify::Error::watch_not_found()));
    }

    #[test]
    fn test_from_config_rejects_missing_root() {
        let mut config = WatchConfig::default();
        config.directories = vec![crate::config::DirectoryEntry::Path(PathBuf::from(
            "/nonexistent/tunnel-logs",
        ))];
        let err = WatchCoordinator::from_config(&config, offline_pipeline()).unwrap_err();
        assert!(matches!(err, WatcherError::MissingRoot(_)));
        assert!(err.is_config());
    }

    async fn wait_for_cursor(coordinator: &WatchCoordinator, path: &Path) {
        for _ in 0..200 {
            if coordinator.tracker().cursor(path).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cursor for {} never appeared", path.display());
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}
