//! Locate a fault trace block inside a raw flash image.
//!
//! The image is whatever the flash reader dumped, so the block can sit at any
//! byte offset. Candidates are found by sentinel, confirmed by the primary
//! marker, then decoded.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::record::constants::MAGIC_LEN;
use crate::record::{
    DecodeError, DiagnosticRecord, RECORD_SIZE, has_record_signature, is_sentinel_match,
};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Malformed record at offset 0x{offset:X}: {source}")]
    Decode {
        offset: usize,
        #[source]
        source: DecodeError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A confirmed record and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMatch {
    pub offset: usize,
    pub record: DiagnosticRecord,
}

/// Find the first valid record in `data`.
///
/// Returns `Ok(None)` when the image holds no record. A block whose signature
/// matches but whose fields do not decode is an error.
#[instrument(level = "debug", skip(data), fields(len = data.len()))]
pub fn scan(data: &[u8]) -> Result<Option<ScanMatch>, ScanError> {
    let mut start = 0usize;

    while let Some(offset) = find_sentinel(data, start) {
        let end = offset + RECORD_SIZE;
        if end > data.len() {
            debug!(offset, "Sentinel too close to end of image");
            start = offset + MAGIC_LEN;
            continue;
        }

        let candidate = &data[offset..end];
        if !has_record_signature(candidate) {
            debug!(offset = %format!("0x{:X}", offset), "Sentinel without marker, skipping");
            start = offset + MAGIC_LEN;
            continue;
        }

        let record = DiagnosticRecord::decode(candidate)
            .map_err(|source| ScanError::Decode { offset, source })?;
        if !record.secondary_markers_intact() {
            warn!(offset = %format!("0x{:X}", offset), "Record field markers do not match");
        }

        debug!(offset = %format!("0x{:X}", offset), cause = %record.cause, "Record found");
        return Ok(Some(ScanMatch { offset, record }));
    }

    Ok(None)
}

/// Load an image file and scan it.
pub fn scan_file(path: &Path) -> Result<Option<ScanMatch>, ScanError> {
    let data = std::fs::read(path)?;
    scan(&data)
}

fn find_sentinel(data: &[u8], start: usize) -> Option<usize> {
    if start >= data.len() {
        return None;
    }
    data[start..]
        .windows(MAGIC_LEN)
        .position(is_sentinel_match)
        .map(|pos| start + pos)
}
