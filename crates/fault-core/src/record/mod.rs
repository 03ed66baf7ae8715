//! Fault trace record layout and codec.

pub mod codec;
pub mod constants;

pub use codec::{
    DecodeError, DiagnosticRecord, FaultCause, has_record_signature, is_sentinel_match,
};
pub use constants::{RECORD_MAGIC, RECORD_MARKER, RECORD_SIZE};
