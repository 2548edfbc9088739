use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use scw_schemas::{RecordKind, SidecarRecord, Timestamp};
use tracing::warn;

use crate::{ExpectationQueue, FileOutcome, MismatchReport, ReconcileHealth, Verdict};

/// Error returned when an observed record has no queued expectation.
///
/// Either a scenario forgot to assert a sidecar or the producer emitted one
/// twice. Matching is positional, so every record after this point would be
/// compared against the wrong expectation; the run cannot continue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolDesync {
    /// 0-based index of the offending record across the whole run.
    pub position: u64,
    pub kind: RecordKind,
    pub consensus_timestamp: Timestamp,
}

impl std::fmt::Display for ProtocolDesync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "protocol desync: {} record #{} (consensus {}.{:09}) arrived with no expected \
             sidecar queued",
            self.kind,
            self.position,
            self.consensus_timestamp.seconds,
            self.consensus_timestamp.nanos
        )
    }
}

impl std::error::Error for ProtocolDesync {}

/// Pops one expectation per observed record and compares.
///
/// Shared between the watch worker (the only caller of
/// [`consume_next`](Self::consume_next) / [`on_file`](Self::on_file)) and
/// scenario threads that append expectations and read the health at the end.
#[derive(Debug)]
pub struct Reconciler {
    expectations: Arc<ExpectationQueue>,
    report: Arc<MismatchReport>,
    records_consumed: AtomicU64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(ExpectationQueue::new()),
            Arc::new(MismatchReport::new()),
        )
    }

    pub fn with_parts(expectations: Arc<ExpectationQueue>, report: Arc<MismatchReport>) -> Self {
        Self {
            expectations,
            report,
            records_consumed: AtomicU64::new(0),
        }
    }

    pub fn expectations(&self) -> &Arc<ExpectationQueue> {
        &self.expectations
    }

    pub fn report(&self) -> &Arc<MismatchReport> {
        &self.report
    }

    pub fn add_expected(&self, label: impl Into<String>, record: SidecarRecord) {
        self.expectations.append(label, record);
    }

    /// Reconcile a single observed record against the next expectation.
    pub fn consume_next(&self, actual: SidecarRecord) -> Result<Verdict, ProtocolDesync> {
        let position = self.records_consumed.load(Ordering::SeqCst);
        let Some(expected) = self.expectations.pop_next() else {
            return Err(ProtocolDesync {
                position,
                kind: actual.kind(),
                consensus_timestamp: actual.consensus_timestamp,
            });
        };
        self.records_consumed.fetch_add(1, Ordering::SeqCst);

        // The observed record's kind decides; action traces have no comparison yet.
        if !actual.is_comparable() {
            return Ok(Verdict::PassedThrough);
        }

        if actual == expected.record {
            return Ok(Verdict::Matched);
        }

        warn!(
            label = %expected.label,
            position,
            kind = %actual.kind(),
            "sidecar mismatch recorded"
        );
        self.report.record(expected.label, expected.record, actual);
        Ok(Verdict::Mismatched)
    }

    /// Reconcile every record of one decoded file, in order. Stops at the first
    /// desync; records before it stay reconciled.
    pub fn on_file(&self, records: Vec<SidecarRecord>) -> Result<FileOutcome, ProtocolDesync> {
        let mut outcome = FileOutcome::default();
        for record in records {
            outcome.extend([self.consume_next(record)?]);
        }
        Ok(outcome)
    }

    pub fn records_consumed(&self) -> u64 {
        self.records_consumed.load(Ordering::SeqCst)
    }

    pub fn has_mismatches(&self) -> bool {
        !self.report.is_empty()
    }

    pub fn queue_is_drained(&self) -> bool {
        self.expectations.is_drained()
    }

    pub fn has_undrained_expectations(&self) -> bool {
        !self.queue_is_drained()
    }

    pub fn health(&self) -> ReconcileHealth {
        ReconcileHealth {
            mismatches: self.report.len(),
            pending_expectations: self.expectations.len(),
        }
    }
}
