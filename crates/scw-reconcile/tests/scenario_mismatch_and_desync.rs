//! Scenario: Mismatch Recording and Protocol Desync
//!
//! # Invariants under test
//!
//! 1. A differing state-change record produces exactly one mismatch entry
//!    carrying the expected/actual pair.
//! 2. Action records never produce a mismatch, even when they differ.
//! 3. Two mismatches under the same label are both reported, in order.
//! 4. A record with no queued expectation is a ProtocolDesync, not a skip.
//! 5. Two exactly matching records leave a healthy, drained run.
//! 6. Zero-padded storage words in a loaded expectation match the canonical
//!    encoding.

use scw_reconcile::{ExpectedEntry, ProtocolDesync, Reconciler, Verdict};
use scw_schemas::{
    CallType, ContractAction, ContractId, ContractStateChange, RecordKind, SidecarRecord,
    StorageChange, Timestamp,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ts() -> Timestamp {
    Timestamp::new(1_700_000_000, 42)
}

fn slot0(before: u64, after: u64) -> SidecarRecord {
    SidecarRecord::state_changes(
        ts(),
        vec![ContractStateChange {
            contract_id: ContractId::num(1001),
            storage_changes: vec![StorageChange::read_write(0, before, after)],
        }],
    )
}

fn call(gas_used: i64) -> SidecarRecord {
    SidecarRecord::actions(
        ts(),
        vec![ContractAction {
            call_type: CallType::Call,
            call_depth: 0,
            caller: None,
            recipient: Some(ContractId::num(1001)),
            gas: 100_000,
            gas_used,
            value: 0,
            input: "0x".to_string(),
            output: "0x".to_string(),
        }],
    )
}

// ---------------------------------------------------------------------------
// 1. State-change mismatch
// ---------------------------------------------------------------------------

#[test]
fn state_change_value_drift_is_recorded() {
    let rc = Reconciler::new();
    rc.add_expected("t1", slot0(55, 55));

    let outcome = rc.on_file(vec![slot0(55, 60)]).unwrap();
    assert_eq!(outcome.mismatched, 1);
    assert!(rc.has_mismatches());

    let entries = rc.report().entries_for("t1");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, "t1");
    assert_eq!(entries[0].expected, slot0(55, 55));
    assert_eq!(entries[0].actual, slot0(55, 60));
}

// ---------------------------------------------------------------------------
// 2. Non-comparable pass-through
// ---------------------------------------------------------------------------

#[test]
fn differing_action_records_pass_through() {
    let rc = Reconciler::new();
    rc.add_expected("actions", call(21_000));

    assert_eq!(
        rc.consume_next(call(99_999)).unwrap(),
        Verdict::PassedThrough
    );
    assert!(!rc.has_mismatches());
    assert!(rc.queue_is_drained());
}

#[test]
fn action_record_against_state_change_expectation_passes_through() {
    let rc = Reconciler::new();
    rc.add_expected("mixed", slot0(1, 2));

    assert_eq!(rc.consume_next(call(1)).unwrap(), Verdict::PassedThrough);
    assert!(!rc.has_mismatches());
}

// ---------------------------------------------------------------------------
// 3. Report completeness
// ---------------------------------------------------------------------------

#[test]
fn two_mismatches_under_one_label_are_both_reported() {
    let rc = Reconciler::new();
    rc.add_expected("s1", slot0(1, 1));
    rc.add_expected("s1", slot0(2, 2));

    rc.on_file(vec![slot0(1, 9)]).unwrap();
    rc.on_file(vec![slot0(2, 8)]).unwrap();

    let entries = rc.report().entries_for("s1");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].actual, slot0(1, 9));
    assert_eq!(entries[1].actual, slot0(2, 8));

    let text = rc.report().render();
    assert!(text.contains("label 's1': 2 mismatched sidecar(s)"));
    assert!(text.find("#1").unwrap() < text.find("#2").unwrap());
}

// ---------------------------------------------------------------------------
// 4. Desync
// ---------------------------------------------------------------------------

#[test]
fn record_without_expectation_is_desync() {
    let rc = Reconciler::new();

    let err = rc.on_file(vec![slot0(55, 60)]).unwrap_err();
    assert_eq!(
        err,
        ProtocolDesync {
            position: 0,
            kind: RecordKind::StateChange,
            consensus_timestamp: ts(),
        }
    );
    assert!(err.to_string().contains("no expected sidecar queued"));
    assert!(!rc.has_mismatches());
}

#[test]
fn desync_mid_file_keeps_earlier_verdicts() {
    let rc = Reconciler::new();
    rc.add_expected("only", slot0(1, 1));

    let err = rc.on_file(vec![slot0(1, 1), slot0(2, 2)]).unwrap_err();
    assert_eq!(err.position, 1);
    assert_eq!(rc.records_consumed(), 1);
    assert!(!rc.has_mismatches());
}

// ---------------------------------------------------------------------------
// 5. Clean run
// ---------------------------------------------------------------------------

#[test]
fn two_matching_records_leave_clean_run() {
    let rc = Reconciler::new();
    rc.add_expected("ok", slot0(3, 4));
    rc.add_expected("ok", slot0(5, 6));

    let outcome = rc.on_file(vec![slot0(3, 4), slot0(5, 6)]).unwrap();
    assert_eq!(outcome.matched, 2);
    assert_eq!(outcome.records(), 2);
    assert!(!rc.has_mismatches());
    assert!(!rc.has_undrained_expectations());
    assert_eq!(rc.report().render(), "no mismatched sidecars");
}

// ---------------------------------------------------------------------------
// 6. Padded hex words in loaded expectations
// ---------------------------------------------------------------------------

#[test]
fn zero_padded_expectation_matches_canonical_record() {
    let mut raw = serde_json::to_value(ExpectedEntry::new("t1", slot0(55, 55))).unwrap();
    let change = raw
        .pointer_mut("/record/payload/contract_state_changes/0/storage_changes/0")
        .unwrap();
    change["slot"] = "0x0000".into();
    change["value_read"] = "0x0037".into();
    change["value_written"] = "0x0037".into();
    let expected: ExpectedEntry = serde_json::from_value(raw).unwrap();

    let rc = Reconciler::new();
    rc.add_expected(expected.label, expected.record);
    assert_eq!(rc.consume_next(slot0(55, 55)).unwrap(), Verdict::Matched);
    assert!(!rc.has_mismatches());
}
