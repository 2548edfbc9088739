//! FIFO of expectations shared between scenario threads and the watch worker.
//!
//! Appends may come from many scenario threads at once; exactly one consumer
//! pops. Each operation takes the lock once, so call order is preserved and no
//! reader ever sees a half-appended entry. Unbounded for the life of a run.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use scw_schemas::SidecarRecord;

use crate::ExpectedEntry;

#[derive(Debug, Default)]
pub struct ExpectationQueue {
    entries: Mutex<VecDeque<ExpectedEntry>>,
}

impl ExpectationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking appender cannot leave the deque half-written, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<ExpectedEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, label: impl Into<String>, record: SidecarRecord) {
        self.lock().push_back(ExpectedEntry::new(label, record));
    }

    /// `None` means the queue is empty; the caller decides whether that is fatal.
    pub fn pop_next(&self) -> Option<ExpectedEntry> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Alias of [`is_empty`](Self::is_empty) in end-of-run vocabulary.
    pub fn is_drained(&self) -> bool {
        self.is_empty()
    }

    /// Labels of the entries still waiting, in queue order.
    pub fn pending_labels(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.label.clone()).collect()
    }
}
