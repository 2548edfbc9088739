//! scw-reconcile
//!
//! Positional reconciliation of observed sidecar records against expected ones.
//!
//! Architectural decisions:
//! - Expectations are consumed strictly FIFO across the whole run
//! - Only comparable kinds (bytecode, state change) can mismatch
//! - A record with no queued expectation is a fatal desync, never a skip
//! - Mismatches are recorded, never raised; the end-of-run query reports them
//!
//! Pure logic plus mutex-guarded bookkeeping. No IO.

mod engine;
mod queue;
mod report;
mod types;

pub use engine::{ProtocolDesync, Reconciler};
pub use queue::ExpectationQueue;
pub use report::MismatchReport;
pub use types::*;
