//! Fixtures for driving a sidecar watcher the way the record-stream producer
//! would: conforming file names, atomically published container files, and
//! record builders for the shapes scenarios assert.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use scw_reconcile::ExpectedEntry;
use scw_schemas::{ContractId, SidecarFile, SidecarRecord, StorageChange};
use scw_watch::SidecarFileName;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

mod records;

pub use records::{action_call, bytecode_created, bytecode_failed, consensus_at, state_change};

/// 2024-01-01T00:00:00Z
const FIRST_FILE_EPOCH_SECS: i64 = 1_704_067_200;

/// A temporary sidecar directory plus a staging directory on the same
/// filesystem, so files appear in the watched directory by rename only.
pub struct SidecarDir {
    root: TempDir,
    watched: PathBuf,
    staging: PathBuf,
    next_second: i64,
}

impl SidecarDir {
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("create temp root")?;
        let watched = root.path().join("sidecar");
        let staging = root.path().join("staging");
        fs::create_dir_all(&watched).with_context(|| format!("create_dir_all {:?}", watched))?;
        fs::create_dir_all(&staging).with_context(|| format!("create_dir_all {:?}", staging))?;
        Ok(Self {
            root,
            watched,
            staging,
            next_second: 0,
        })
    }

    /// Directory to hand to the watcher.
    pub fn path(&self) -> &Path {
        &self.watched
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Next conforming name, one second after the previous, sequence 01.
    pub fn next_name(&mut self) -> Result<SidecarFileName> {
        let secs = FIRST_FILE_EPOCH_SECS + self.next_second;
        let ts = Utc
            .timestamp_opt(secs, 7)
            .single()
            .with_context(|| format!("no UTC instant at {secs}s"))?;
        self.next_second += 1;
        SidecarFileName::new(ts, 1).context("sequence 01 out of range")
    }

    /// Publish a container holding `records` under the next conforming name.
    pub fn publish(&mut self, records: &[SidecarRecord]) -> Result<PathBuf> {
        let name = self.next_name()?;
        self.publish_as(&name.format(), records)
    }

    pub fn publish_as(&self, name: &str, records: &[SidecarRecord]) -> Result<PathBuf> {
        let file = SidecarFile {
            sidecar_records: records.to_vec(),
        };
        let bytes = serde_json::to_vec(&file).context("serialize sidecar file")?;
        self.publish_raw(name, &bytes)
    }

    /// Publish arbitrary bytes under `name` (for malformed-file scenarios).
    pub fn publish_raw(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let staged = self.staging.join(name);
        fs::write(&staged, bytes).with_context(|| format!("write {:?}", staged))?;
        let target = self.watched.join(name);
        fs::rename(&staged, &target)
            .with_context(|| format!("rename {:?} -> {:?}", staged, target))?;
        Ok(target)
    }
}

/// Serialize expectations the way `scw watch --expectations` reads them.
pub fn write_expectations(path: &Path, entries: &[ExpectedEntry]) -> Result<()> {
    let s = serde_json::to_string_pretty(entries).context("serialize expectations")?;
    fs::write(path, s).with_context(|| format!("write expectations {:?}", path))
}

/// Poll `cond` until it holds or `timeout` elapses. Returns the last result.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Canonical record for the "slot 0 of contract 0.0.1001" scenarios.
pub fn slot0_change(before: u64, after: u64) -> SidecarRecord {
    state_change(
        consensus_at(1_700_000_000),
        ContractId::num(1001),
        vec![StorageChange::read_write(0, before, after)],
    )
}
