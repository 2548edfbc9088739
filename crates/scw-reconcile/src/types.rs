use scw_schemas::SidecarRecord;
use serde::{Deserialize, Serialize};

/// A record a scenario asserts will appear, tagged with the scenario label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedEntry {
    pub label: String,
    pub record: SidecarRecord,
}

impl ExpectedEntry {
    pub fn new(label: impl Into<String>, record: SidecarRecord) -> Self {
        Self {
            label: label.into(),
            record,
        }
    }
}

/// Evidence of a comparable record that differed from its expectation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchEntry {
    pub label: String,
    pub expected: SidecarRecord,
    pub actual: SidecarRecord,
}

/// What happened to a single observed record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Matched,
    Mismatched,
    /// Non-comparable kind: the expectation was consumed, nothing compared.
    PassedThrough,
}

/// Tally for one observed file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub matched: usize,
    pub mismatched: usize,
    pub passed_through: usize,
}

impl FileOutcome {
    pub fn records(&self) -> usize {
        self.matched + self.mismatched + self.passed_through
    }

    fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Matched => self.matched += 1,
            Verdict::Mismatched => self.mismatched += 1,
            Verdict::PassedThrough => self.passed_through += 1,
        }
    }
}

impl Extend<Verdict> for FileOutcome {
    fn extend<I: IntoIterator<Item = Verdict>>(&mut self, iter: I) {
        for v in iter {
            self.add(v);
        }
    }
}

/// End-of-run health. Healthy means no mismatches AND no undrained expectations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileHealth {
    pub mismatches: usize,
    pub pending_expectations: usize,
}

impl ReconcileHealth {
    pub fn is_healthy(&self) -> bool {
        self.mismatches == 0 && self.pending_expectations == 0
    }
}
