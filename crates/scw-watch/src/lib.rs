//! scw-watch
//!
//! Watches a sidecar directory on a dedicated worker thread and feeds every
//! newly created sidecar file through the reconciler.
//!
//! Provides:
//! - Sidecar file-name recognition (`name`)
//! - The decoder seam and the JSON container decoder (`decoder`)
//! - Notification sources: directory polling and in-process channel (`source`)
//! - The finish-after-next flag (`state`)
//! - The watch loop and the owning `SidecarWatcher` handle (`session`)

pub mod decoder;
pub mod error;
pub mod name;
pub mod session;
pub mod source;
pub mod state;

pub use decoder::{decoder_fn, DecodeError, FnDecoder, JsonSidecarDecoder, SidecarDecoder};
pub use error::WatchError;
pub use name::{is_sidecar_file_name, SidecarFileName, MAX_SEQUENCE, SIDECAR_EXTENSION};
pub use session::{run_watch_loop, SidecarWatcher, WatchExit, WatchStats, WatchSummary};
pub use source::{
    channel_source, ChannelFeeder, ChannelSource, Notification, NotificationSource,
    PollingSource, SourceCloser,
};
pub use state::WatcherState;
