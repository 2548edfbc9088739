use std::path::PathBuf;

use scw_reconcile::ProtocolDesync;
use thiserror::Error;

use crate::DecodeError;

/// Conditions that end a watch session. Mismatches are not errors; they are
/// recorded and reported at the end of the run.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Desync(#[from] ProtocolDesync),

    #[error("failed to decode sidecar file {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("notification source for {} is no longer valid: {reason}", .dir.display())]
    SourceInvalid { dir: PathBuf, reason: String },

    #[error("failed to spawn watch worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("watch worker panicked")]
    WorkerPanicked,
}

impl WatchError {
    /// Short stable tag for logs and summaries.
    pub fn code(&self) -> &'static str {
        match self {
            WatchError::Desync(_) => "PROTOCOL_DESYNC",
            WatchError::Decode { .. } => "DECODE_ERROR",
            WatchError::SourceInvalid { .. } => "NOTIFICATION_SOURCE_INVALID",
            WatchError::Spawn(_) => "WORKER_SPAWN_FAILED",
            WatchError::WorkerPanicked => "WORKER_PANICKED",
        }
    }
}
