//! Sidecar container decoding.
//!
//! The watcher only needs `decode(path) -> records`. The production binary
//! format lives outside this crate; [`JsonSidecarDecoder`] reads the JSON
//! rendition of the same container ([`SidecarFile`]) and is what the CLI and
//! the fixtures use.

use std::fs;
use std::path::Path;

use scw_schemas::{SidecarFile, SidecarRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("sidecar file could not be read: {0}")]
    Io(#[from] std::io::Error),

    /// Zero bytes on disk. Distinct from a well-formed container with zero records.
    #[error("sidecar file is empty")]
    Empty,

    #[error("sidecar file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Turns one sidecar file into its records, in file order.
pub trait SidecarDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Vec<SidecarRecord>, DecodeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSidecarDecoder;

impl JsonSidecarDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl SidecarDecoder for JsonSidecarDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<SidecarRecord>, DecodeError> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let file: SidecarFile = serde_json::from_slice(&bytes)?;
        Ok(file.sidecar_records)
    }
}

/// Adapter so a plain closure can stand in for a decoder.
pub struct FnDecoder<F>(F);

impl<F> SidecarDecoder for FnDecoder<F>
where
    F: Fn(&Path) -> Result<Vec<SidecarRecord>, DecodeError> + Send + Sync,
{
    fn decode(&self, path: &Path) -> Result<Vec<SidecarRecord>, DecodeError> {
        (self.0)(path)
    }
}

pub fn decoder_fn<F>(f: F) -> FnDecoder<F>
where
    F: Fn(&Path) -> Result<Vec<SidecarRecord>, DecodeError> + Send + Sync,
{
    FnDecoder(f)
}
