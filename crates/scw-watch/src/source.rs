//! Notification sources.
//!
//! The watch loop blocks in [`NotificationSource::next_event`] until a new
//! directory entry shows up or the source is closed. Two implementations:
//!
//! - [`PollingSource`] rescans the directory on a fixed interval. Entries that
//!   exist when the source is created are never reported.
//! - [`ChannelSource`] is fed in-process through a [`ChannelFeeder`], for
//!   producers living in the same process and for tests.
//!
//! Closing goes through a [`SourceCloser`] obtained before the source moves
//! onto the worker thread.

use std::collections::{HashSet, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::WatchError;

/// Longest uninterrupted sleep while polling, so a close is noticed promptly.
const CLOSE_CHECK_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A new entry appeared in the watched directory.
    Created(PathBuf),
    /// The source was closed; no further events will follow.
    Closed,
}

pub trait NotificationSource: Send + 'static {
    /// Block until the next event. `Err` means the source is permanently
    /// unusable (directory removed or inaccessible).
    fn next_event(&mut self) -> Result<Notification, WatchError>;

    fn closer(&self) -> Arc<dyn SourceCloser>;

    /// Directory being watched, for logs.
    fn dir(&self) -> &Path;
}

/// Handle that makes a blocked [`NotificationSource::next_event`] return
/// [`Notification::Closed`]. Closing twice is harmless.
pub trait SourceCloser: Send + Sync {
    fn close(&self);
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Directory rescanner.
///
/// `seen` holds one name per file ever observed and is never pruned, so
/// memory grows with the number of files written during the session. A
/// session is one test run, which keeps this small; a long-lived watcher over
/// a busy directory would need a high-water mark on the sorted names instead.
#[derive(Debug)]
pub struct PollingSource {
    dir: PathBuf,
    interval: Duration,
    seen: HashSet<OsString>,
    pending: VecDeque<PathBuf>,
    closed: Arc<AtomicBool>,
}

#[derive(Debug)]
struct FlagCloser(Arc<AtomicBool>);

impl SourceCloser for FlagCloser {
    fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl PollingSource {
    /// Fails with [`WatchError::SourceInvalid`] when `dir` cannot be listed.
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Result<Self, WatchError> {
        let dir = dir.into();
        let seen = list_files(&dir)?.into_iter().collect();
        Ok(Self {
            dir,
            interval,
            seen,
            pending: VecDeque::new(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn scan(&mut self) -> Result<(), WatchError> {
        let mut fresh: Vec<OsString> = list_files(&self.dir)?
            .into_iter()
            .filter(|n| !self.seen.contains(n))
            .collect();
        // Sidecar names sort chronologically.
        fresh.sort();
        for name in fresh {
            self.pending.push_back(self.dir.join(&name));
            self.seen.insert(name);
        }
        Ok(())
    }

    fn sleep_interval(&self) {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.is_closed() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(CLOSE_CHECK_SLICE));
        }
    }
}

impl NotificationSource for PollingSource {
    fn next_event(&mut self) -> Result<Notification, WatchError> {
        loop {
            if self.is_closed() {
                return Ok(Notification::Closed);
            }
            if let Some(path) = self.pending.pop_front() {
                return Ok(Notification::Created(path));
            }
            self.scan()?;
            if self.pending.is_empty() {
                self.sleep_interval();
            }
        }
    }

    fn closer(&self) -> Arc<dyn SourceCloser> {
        Arc::new(FlagCloser(Arc::clone(&self.closed)))
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

fn list_files(dir: &Path) -> Result<Vec<OsString>, WatchError> {
    let invalid = |e: std::io::Error| WatchError::SourceInvalid {
        dir: dir.to_path_buf(),
        reason: e.to_string(),
    };

    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(invalid)? {
        let entry = entry.map_err(invalid)?;
        match entry.file_type() {
            Ok(ft) if ft.is_file() => out.push(entry.file_name()),
            Ok(_) => {}
            // Entry vanished between listing and stat; it is not ours to report.
            Err(e) => debug!(entry = ?entry.path(), error = %e, "skipping unreadable entry"),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// In-process channel
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ChannelEvent {
    Created(PathBuf),
    Closed,
    Invalid(String),
}

/// Receiving half, handed to the watcher.
#[derive(Debug)]
pub struct ChannelSource {
    dir: PathBuf,
    rx: Receiver<ChannelEvent>,
    tx: Sender<ChannelEvent>,
    closed: bool,
}

/// Sending half, kept by the producer.
#[derive(Debug, Clone)]
pub struct ChannelFeeder {
    dir: PathBuf,
    tx: Sender<ChannelEvent>,
}

#[derive(Debug)]
struct ChannelCloser(Sender<ChannelEvent>);

impl SourceCloser for ChannelCloser {
    fn close(&self) {
        // The receiver may already be gone with the worker; nothing left to wake.
        let _ = self.0.send(ChannelEvent::Closed);
    }
}

/// Build a connected feeder/source pair for `dir`. Names passed to the feeder
/// are resolved against `dir`.
pub fn channel_source(dir: impl Into<PathBuf>) -> (ChannelFeeder, ChannelSource) {
    let dir = dir.into();
    let (tx, rx) = mpsc::channel();
    (
        ChannelFeeder {
            dir: dir.clone(),
            tx: tx.clone(),
        },
        ChannelSource {
            dir,
            rx,
            tx,
            closed: false,
        },
    )
}

impl ChannelFeeder {
    /// Announce a created entry. Returns `false` once the watcher is gone.
    pub fn created(&self, name: impl AsRef<Path>) -> bool {
        self.tx
            .send(ChannelEvent::Created(self.dir.join(name)))
            .is_ok()
    }

    /// Report the watched directory as permanently unusable.
    pub fn invalidate(&self, reason: impl Into<String>) -> bool {
        self.tx.send(ChannelEvent::Invalid(reason.into())).is_ok()
    }

    pub fn close(&self) -> bool {
        self.tx.send(ChannelEvent::Closed).is_ok()
    }
}

impl NotificationSource for ChannelSource {
    fn next_event(&mut self) -> Result<Notification, WatchError> {
        if self.closed {
            return Ok(Notification::Closed);
        }
        // The source holds a sender itself, so recv only fails if that
        // invariant is broken; treat it like a close.
        match self.rx.recv() {
            Ok(ChannelEvent::Created(path)) => Ok(Notification::Created(path)),
            Ok(ChannelEvent::Invalid(reason)) => Err(WatchError::SourceInvalid {
                dir: self.dir.clone(),
                reason,
            }),
            Ok(ChannelEvent::Closed) | Err(_) => {
                self.closed = true;
                Ok(Notification::Closed)
            }
        }
    }

    fn closer(&self) -> Arc<dyn SourceCloser> {
        Arc::new(ChannelCloser(self.tx.clone()))
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}
