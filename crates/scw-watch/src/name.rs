//! Sidecar file naming.
//!
//! A sidecar file is named after the consensus timestamp of the first
//! transaction in its record file plus a two-digit sequence id:
//!
//! ```text
//! 2024-01-02T03_04_05.123456789Z_01.rcd
//! ```
//!
//! Names compare chronologically when compared as plain strings.

use chrono::{DateTime, NaiveDateTime, Utc};

pub const SIDECAR_EXTENSION: &str = "rcd";

/// `d` marks an ASCII digit; every other byte must match literally.
const TIMESTAMP_SHAPE: &[u8] = b"dddd-dd-ddTdd_dd_dd.dddddddddZ";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H_%M_%S%.9fZ";

/// Largest sequence id that fits the two-digit field.
pub const MAX_SEQUENCE: u8 = 99;

/// Fields are private so every value formats to a name that parses back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SidecarFileName {
    timestamp: DateTime<Utc>,
    sequence: u8,
}

impl SidecarFileName {
    /// `None` when `sequence` exceeds [`MAX_SEQUENCE`].
    pub fn new(timestamp: DateTime<Utc>, sequence: u8) -> Option<Self> {
        (sequence <= MAX_SEQUENCE).then_some(Self {
            timestamp,
            sequence,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Strict parse; `None` for anything that is not exactly a sidecar name.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(SIDECAR_EXTENSION)?.strip_suffix('.')?;
        let (ts, seq) = stem.rsplit_once('_')?;

        if seq.len() != 2 || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !matches_shape(ts) {
            return None;
        }

        let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            timestamp: naive.and_utc(),
            sequence: seq.parse().ok()?,
        })
    }

    pub fn format(&self) -> String {
        format!(
            "{}_{:02}.{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.sequence,
            SIDECAR_EXTENSION
        )
    }
}

impl std::fmt::Display for SidecarFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

fn matches_shape(ts: &str) -> bool {
    ts.len() == TIMESTAMP_SHAPE.len()
        && ts
            .bytes()
            .zip(TIMESTAMP_SHAPE.iter())
            .all(|(b, &want)| match want {
                b'd' => b.is_ascii_digit(),
                lit => b == lit,
            })
}

pub fn is_sidecar_file_name(name: &str) -> bool {
    SidecarFileName::parse(name).is_some()
}
