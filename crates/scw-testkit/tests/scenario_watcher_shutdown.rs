//! Scenario: Watcher Shutdown Protocol
//!
//! # Invariants under test
//!
//! 1. finish-after-next stops the loop after exactly one more sidecar file:
//!    not zero (the loop keeps waiting until a file arrives) and not two.
//! 2. Calling finish repeatedly behaves like calling it once.
//! 3. Closing the source wakes an idle watcher, which exits Closed.
//! 4. A malformed sidecar file ends the session with a decode error, and no
//!    later file is processed.
//! 5. Removing the watched directory ends the session as source-invalid.
//! 6. Expectations appended concurrently from many scenario threads are all
//!    accounted for.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scw_reconcile::Reconciler;
use scw_testkit::{slot0_change, wait_for, SidecarDir};
use scw_watch::{JsonSidecarDecoder, PollingSource, SidecarWatcher, WatchError, WatchExit};

const POLL: Duration = Duration::from_millis(5);
const PATIENCE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// 1 + 2. Finish after exactly one more file
// ---------------------------------------------------------------------------

#[test]
fn finish_waits_for_one_file_then_stops() {
    let mut dir = SidecarDir::new().unwrap();
    let mut w = SidecarWatcher::watch_dir(dir.path(), POLL).unwrap();
    w.add_expected_sidecar("one", slot0_change(1, 1));
    w.add_expected_sidecar("two", slot0_change(2, 2));

    for _ in 0..3 {
        w.finish_watching_after_next_sidecar();
    }

    // Not zero: with no file yet the loop keeps waiting.
    thread::sleep(Duration::from_millis(50));
    assert!(!w.is_finished());

    dir.publish(&[slot0_change(1, 1)]).unwrap();
    dir.publish(&[slot0_change(2, 2)]).unwrap();

    assert_eq!(w.wait_until_finished().unwrap(), WatchExit::FinishedAfterNext);
    // Not two: the second file is left alone.
    assert_eq!(w.stats().files_processed(), 1);
    assert!(w.has_undrained_expectations());
    assert_eq!(
        w.reconciler().expectations().pending_labels(),
        vec!["two".to_string()]
    );
}

// ---------------------------------------------------------------------------
// 3. Close
// ---------------------------------------------------------------------------

#[test]
fn close_wakes_idle_watcher() {
    let dir = SidecarDir::new().unwrap();
    let mut w = SidecarWatcher::watch_dir(dir.path(), Duration::from_secs(30)).unwrap();
    thread::sleep(Duration::from_millis(20));

    assert_eq!(w.tear_down().unwrap(), WatchExit::Closed);
    assert_eq!(w.summary().exit, Some(WatchExit::Closed));
}

#[test]
fn close_from_another_thread() {
    let dir = SidecarDir::new().unwrap();
    let mut w = SidecarWatcher::watch_dir(dir.path(), POLL).unwrap();
    let closer = w.closer();

    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        closer.close();
    });

    assert_eq!(w.wait_until_finished().unwrap(), WatchExit::Closed);
    t.join().unwrap();
}

// ---------------------------------------------------------------------------
// 4. Malformed file
// ---------------------------------------------------------------------------

#[test]
fn malformed_file_is_fatal() {
    let mut dir = SidecarDir::new().unwrap();
    let mut w = SidecarWatcher::watch_dir(dir.path(), POLL).unwrap();
    w.add_expected_sidecar("x", slot0_change(1, 1));

    let bad = dir.next_name().unwrap().format();
    let bad_path = dir.publish_raw(&bad, b"{ not a sidecar container").unwrap();

    let err = w.wait_until_finished().unwrap_err();
    match err {
        WatchError::Decode { path, .. } => assert_eq!(path, &bad_path),
        other => panic!("expected decode error, got {other}"),
    }

    // The session is over: a later file is never looked at.
    dir.publish(&[slot0_change(1, 1)]).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(w.stats().files_processed(), 0);
    assert!(w.has_undrained_expectations());
}

#[test]
fn zero_byte_file_is_fatal() {
    let mut dir = SidecarDir::new().unwrap();
    let mut w = SidecarWatcher::watch_dir(dir.path(), POLL).unwrap();

    let name = dir.next_name().unwrap().format();
    dir.publish_raw(&name, b"").unwrap();

    let err = w.wait_until_finished().unwrap_err();
    assert_eq!(err.code(), "DECODE_ERROR");
    assert!(err.to_string().contains("empty"));
}

// ---------------------------------------------------------------------------
// 5. Directory removed
// ---------------------------------------------------------------------------

#[test]
fn removed_directory_invalidates_source() {
    let dir = SidecarDir::new().unwrap();
    let mut w = SidecarWatcher::watch_dir(dir.path(), POLL).unwrap();

    std::fs::remove_dir_all(dir.path()).unwrap();

    let err = w.wait_until_finished().unwrap_err();
    assert!(matches!(err, WatchError::SourceInvalid { .. }), "got {err}");
    assert_eq!(
        w.terminal_error().map(WatchError::code),
        Some("NOTIFICATION_SOURCE_INVALID")
    );
}

// ---------------------------------------------------------------------------
// 6. Concurrent scenario appends
// ---------------------------------------------------------------------------

#[test]
fn concurrent_appends_then_matching_files() {
    let mut dir = SidecarDir::new().unwrap();
    let reconciler = Arc::new(Reconciler::new());
    let source = PollingSource::new(dir.path(), POLL).unwrap();
    let mut w =
        SidecarWatcher::start_with(Arc::clone(&reconciler), source, JsonSidecarDecoder).unwrap();

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let rc = Arc::clone(&reconciler);
            thread::spawn(move || {
                for _ in 0..5 {
                    rc.add_expected(format!("scenario-{t}"), slot0_change(t, t));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(reconciler.expectations().len(), 20);

    // Replay the queue's own order so every position matches.
    let order = reconciler.expectations().pending_labels();
    let records: Vec<_> = order
        .iter()
        .map(|label| {
            let t: u64 = label.trim_start_matches("scenario-").parse().unwrap();
            slot0_change(t, t)
        })
        .collect();

    let (first, rest) = records.split_at(10);
    dir.publish(first).unwrap();
    assert!(wait_for(PATIENCE, || w.stats().files_processed() == 1));
    w.finish_watching_after_next_sidecar();
    dir.publish(rest).unwrap();

    assert_eq!(w.wait_until_finished().unwrap(), WatchExit::FinishedAfterNext);
    assert!(!w.has_mismatches());
    assert!(!w.has_undrained_expectations());
    assert_eq!(w.summary().records_processed, 20);
}
