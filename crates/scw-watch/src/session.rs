//! Watch loop and the handle that owns it for the length of a run.
//!
//! Lifecycle:
//! 1. [`SidecarWatcher::start`] spawns one named worker thread running
//!    [`run_watch_loop`]. `start_with_state` accepts a flag already set, for
//!    runs that must stop after their first file.
//! 2. Scenarios call `add_expected_sidecar` from any thread while it runs.
//! 3. The run ends in one of three ways: `finish_watching_after_next_sidecar`
//!    (loop exits after the next processed sidecar file), `close`/`tear_down`
//!    (the source is closed, the blocked wait returns), or a fatal error.
//! 4. `wait_until_finished` joins the worker; afterwards the health queries
//!    give the end-of-run verdict.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use scw_reconcile::Reconciler;
use scw_schemas::SidecarRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use crate::{
    is_sidecar_file_name, JsonSidecarDecoder, Notification, NotificationSource, PollingSource,
    SidecarDecoder, SourceCloser, WatchError, WatcherState,
};

const WORKER_THREAD_NAME: &str = "sidecar-watcher";

/// Why the loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchExit {
    Closed,
    FinishedAfterNext,
}

/// Counters maintained by the loop, readable from any thread.
#[derive(Debug, Default)]
pub struct WatchStats {
    files_processed: AtomicU64,
    files_ignored: AtomicU64,
}

impl WatchStats {
    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::SeqCst)
    }

    /// Entries seen that did not match the sidecar naming convention.
    pub fn files_ignored(&self) -> u64 {
        self.files_ignored.load(Ordering::SeqCst)
    }
}

/// Block on `source` and reconcile every sidecar file it reports until the
/// source closes, the finish flag fires, or a fatal error occurs.
///
/// The finish flag is read after each processed sidecar file, so setting it
/// lets exactly one more file through.
pub fn run_watch_loop<S, D>(
    source: &mut S,
    decoder: &D,
    reconciler: &Reconciler,
    state: &WatcherState,
    stats: &WatchStats,
) -> Result<WatchExit, WatchError>
where
    S: NotificationSource + ?Sized,
    D: SidecarDecoder + ?Sized,
{
    loop {
        let path = match source.next_event()? {
            Notification::Closed => return Ok(WatchExit::Closed),
            Notification::Created(path) => path,
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if !is_sidecar_file_name(name) {
            stats.files_ignored.fetch_add(1, Ordering::SeqCst);
            debug!(entry = %path.display(), "ignoring non-sidecar entry");
            continue;
        }

        let records = decoder
            .decode(&path)
            .map_err(|source| WatchError::Decode {
                path: path.clone(),
                source,
            })?;
        let outcome = reconciler.on_file(records)?;
        stats.files_processed.fetch_add(1, Ordering::SeqCst);

        debug!(
            file = name,
            records = outcome.records(),
            matched = outcome.matched,
            mismatched = outcome.mismatched,
            passed_through = outcome.passed_through,
            "sidecar file reconciled"
        );

        if state.terminate_requested() {
            return Ok(WatchExit::FinishedAfterNext);
        }
    }
}

/// Serializable end-of-run snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSummary {
    pub session_id: Uuid,
    pub exit: Option<WatchExit>,
    pub error_code: Option<String>,
    pub files_processed: u64,
    pub files_ignored: u64,
    pub records_processed: u64,
    pub mismatches: usize,
    pub pending_expectations: usize,
}

impl WatchSummary {
    pub fn is_healthy(&self) -> bool {
        self.error_code.is_none() && self.mismatches == 0 && self.pending_expectations == 0
    }
}

/// Owns one watch session: the worker thread, the shared reconciler and the
/// finish flag. Dropping it closes the source and joins the worker.
pub struct SidecarWatcher {
    session_id: Uuid,
    dir: PathBuf,
    reconciler: Arc<Reconciler>,
    state: WatcherState,
    stats: Arc<WatchStats>,
    closer: Arc<dyn SourceCloser>,
    worker: Option<JoinHandle<Result<WatchExit, WatchError>>>,
    exit: Option<Result<WatchExit, WatchError>>,
}

impl std::fmt::Debug for SidecarWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarWatcher")
            .field("session_id", &self.session_id)
            .field("dir", &self.dir)
            .field("running", &self.worker.is_some())
            .field("exit", &self.exit)
            .finish()
    }
}

impl SidecarWatcher {
    /// Poll `dir` every `poll_interval` and decode JSON sidecar containers.
    pub fn watch_dir(dir: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self, WatchError> {
        let source = PollingSource::new(dir, poll_interval)?;
        Self::start(source, JsonSidecarDecoder::new())
    }

    pub fn start<S, D>(source: S, decoder: D) -> Result<Self, WatchError>
    where
        S: NotificationSource,
        D: SidecarDecoder + 'static,
    {
        Self::start_with(Arc::new(Reconciler::new()), source, decoder)
    }

    /// Start on an existing reconciler, e.g. one already holding expectations.
    pub fn start_with<S, D>(
        reconciler: Arc<Reconciler>,
        source: S,
        decoder: D,
    ) -> Result<Self, WatchError>
    where
        S: NotificationSource,
        D: SidecarDecoder + 'static,
    {
        Self::start_with_state(reconciler, WatcherState::new(), source, decoder)
    }

    /// Like [`start_with`](Self::start_with), but the worker shares `state`
    /// from its first instruction. A flag set on `state` beforehand applies to
    /// the very first sidecar file, with no window between spawn and set.
    pub fn start_with_state<S, D>(
        reconciler: Arc<Reconciler>,
        state: WatcherState,
        mut source: S,
        decoder: D,
    ) -> Result<Self, WatchError>
    where
        S: NotificationSource,
        D: SidecarDecoder + 'static,
    {
        let session_id = Uuid::new_v4();
        let dir = source.dir().to_path_buf();
        let stats = Arc::new(WatchStats::default());
        let closer = source.closer();

        let worker = {
            let reconciler = Arc::clone(&reconciler);
            let state = state.clone();
            let stats = Arc::clone(&stats);
            let dir = dir.clone();
            std::thread::Builder::new()
                .name(WORKER_THREAD_NAME.to_string())
                .spawn(move || {
                    let span = info_span!(
                        "sidecar_watch",
                        session_id = %session_id,
                        dir = %dir.display()
                    );
                    let _guard = span.enter();

                    info!("sidecar watch started");
                    let result = run_watch_loop(&mut source, &decoder, &reconciler, &state, &stats);
                    match &result {
                        Ok(exit) => info!(
                            ?exit,
                            files = stats.files_processed(),
                            records = reconciler.records_consumed(),
                            "sidecar watch stopped"
                        ),
                        Err(e) => error!(
                            code = e.code(),
                            error = %e,
                            files = stats.files_processed(),
                            "sidecar watch terminated"
                        ),
                    }
                    result
                })
                .map_err(WatchError::Spawn)?
        };

        Ok(Self {
            session_id,
            dir,
            reconciler,
            state,
            stats,
            closer,
            worker: Some(worker),
            exit: None,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn stats(&self) -> &WatchStats {
        &self.stats
    }

    /// Thread-safe; may be called concurrently from many scenarios.
    pub fn add_expected_sidecar(&self, label: impl Into<String>, record: SidecarRecord) {
        self.reconciler.add_expected(label, record);
    }

    /// Idempotent. The loop stops after the next sidecar file it processes.
    pub fn finish_watching_after_next_sidecar(&self) {
        self.state.finish_after_next();
    }

    /// Detached close handle, usable from another thread while this one waits.
    pub fn closer(&self) -> Arc<dyn SourceCloser> {
        Arc::clone(&self.closer)
    }

    /// Close the source; the worker returns [`WatchExit::Closed`] once its
    /// blocked wait wakes. Does not join.
    pub fn close(&self) {
        self.closer.close();
    }

    pub fn is_finished(&self) -> bool {
        match &self.worker {
            Some(w) => w.is_finished(),
            None => true,
        }
    }

    /// Join the worker (once) and return how it ended.
    pub fn wait_until_finished(&mut self) -> Result<WatchExit, &WatchError> {
        if let Some(worker) = self.worker.take() {
            let result = worker.join().unwrap_or(Err(WatchError::WorkerPanicked));
            self.exit = Some(result);
        }
        // worker and exit are only ever swapped together
        match self.exit.get_or_insert(Err(WatchError::WorkerPanicked)) {
            Ok(exit) => Ok(*exit),
            Err(e) => Err(&*e),
        }
    }

    /// Close the source and join.
    pub fn tear_down(&mut self) -> Result<WatchExit, &WatchError> {
        self.close();
        self.wait_until_finished()
    }

    /// The fatal error the worker stopped on, once joined.
    pub fn terminal_error(&self) -> Option<&WatchError> {
        match &self.exit {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    pub fn has_mismatches(&self) -> bool {
        self.reconciler.has_mismatches()
    }

    pub fn has_undrained_expectations(&self) -> bool {
        self.reconciler.has_undrained_expectations()
    }

    pub fn report(&self) -> String {
        self.reconciler.report().render()
    }

    pub fn summary(&self) -> WatchSummary {
        let health = self.reconciler.health();
        WatchSummary {
            session_id: self.session_id,
            exit: match &self.exit {
                Some(Ok(exit)) => Some(*exit),
                _ => None,
            },
            error_code: self.terminal_error().map(|e| e.code().to_string()),
            files_processed: self.stats.files_processed(),
            files_ignored: self.stats.files_ignored(),
            records_processed: self.reconciler.records_consumed(),
            mismatches: health.mismatches,
            pending_expectations: health.pending_expectations,
        }
    }
}

impl Drop for SidecarWatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.closer.close();
            let _ = worker.join();
        }
    }
}
