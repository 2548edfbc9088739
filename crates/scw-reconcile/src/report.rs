//! Accumulated mismatches for a run, keyed by scenario label.
//!
//! Labels render in sorted order so the summary is stable; entries under a
//! label keep the order they were recorded in.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};

use scw_schemas::SidecarRecord;

use crate::MismatchEntry;

#[derive(Debug, Default)]
pub struct MismatchReport {
    by_label: Mutex<BTreeMap<String, Vec<MismatchEntry>>>,
}

impl MismatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<MismatchEntry>>> {
        self.by_label.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, label: impl Into<String>, expected: SidecarRecord, actual: SidecarRecord) {
        let label = label.into();
        let entry = MismatchEntry {
            label: label.clone(),
            expected,
            actual,
        };
        self.lock().entry(label).or_default().push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total mismatches across all labels.
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Copy of the entries recorded under `label`, in recorded order.
    pub fn entries_for(&self, label: &str) -> Vec<MismatchEntry> {
        self.lock().get(label).cloned().unwrap_or_default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Human-readable summary: one block per label with a count and the
    /// enumerated (expected, actual) pairs.
    pub fn render(&self) -> String {
        let by_label = self.lock();
        if by_label.is_empty() {
            return "no mismatched sidecars".to_string();
        }

        let mut out = String::new();
        for (label, entries) in by_label.iter() {
            let _ = writeln!(
                out,
                "label '{}': {} mismatched sidecar(s)",
                label,
                entries.len()
            );
            for (i, e) in entries.iter().enumerate() {
                let _ = writeln!(out, "  #{}", i + 1);
                let _ = writeln!(out, "    expected: {}", render_record(&e.expected));
                let _ = writeln!(out, "    actual:   {}", render_record(&e.actual));
            }
        }
        out
    }
}

fn render_record(r: &SidecarRecord) -> String {
    serde_json::to_string(r).unwrap_or_else(|_| format!("{r:?}"))
}
