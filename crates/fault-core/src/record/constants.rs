//! Layout constants for the fault trace block.
//!
//! These must stay in step with the `FaultData` struct the firmware writes
//! into flash when its fault handler fires.

// ============================================================================
// Signature
// ============================================================================

/// Sentinel word at the start of every trace block.
pub const RECORD_MAGIC: u32 = 0xFEFE_FAFA;

/// Primary marker following the sentinel (32 bytes, NUL terminated).
pub const RECORD_MARKER: &[u8; MARKER_LEN] = b"FeatherFault Data Here! Caused:\0";

/// Secondary markers placed before each field.
pub const CORRUPTED_MARKER: &[u8; TAG_LEN] = b"My Bad:\0";
pub const FAILNUM_MARKER: &[u8; TAG_LEN] = b"Fail #:\0";
pub const LINE_MARKER: &[u8; TAG_LEN] = b"Line #:\0";
pub const FILE_MARKER: &[u8; TAG_LEN] = b"File:\0\0\0";

/// The firmware declares the file tag as 6 bytes; the last two bytes of its
/// slot are padding with no defined value.
pub const FILE_MARKER_LEN: usize = 6;

// ============================================================================
// Field sizes
// ============================================================================

pub const MAGIC_LEN: usize = 4;
pub const MARKER_LEN: usize = 32;
pub const TAG_LEN: usize = 8;
pub const WORD_LEN: usize = 4;
pub const FILE_LEN: usize = 64;

// ============================================================================
// Field offsets
// ============================================================================

pub const MAGIC_OFFSET: usize = 0;
pub const MARKER_OFFSET: usize = MAGIC_OFFSET + MAGIC_LEN; // 4
pub const CAUSE_OFFSET: usize = MARKER_OFFSET + MARKER_LEN; // 36
pub const MARKER2_OFFSET: usize = CAUSE_OFFSET + WORD_LEN; // 40
pub const CORRUPTED_OFFSET: usize = MARKER2_OFFSET + TAG_LEN; // 48
pub const MARKER3_OFFSET: usize = CORRUPTED_OFFSET + WORD_LEN; // 52
pub const FAILNUM_OFFSET: usize = MARKER3_OFFSET + TAG_LEN; // 60
pub const MARKER4_OFFSET: usize = FAILNUM_OFFSET + WORD_LEN; // 64
pub const LINE_OFFSET: usize = MARKER4_OFFSET + TAG_LEN; // 72
pub const MARKER5_OFFSET: usize = LINE_OFFSET + WORD_LEN; // 76
pub const FILE_OFFSET: usize = MARKER5_OFFSET + TAG_LEN; // 84

/// Total size of one trace block (packed, no padding).
pub const RECORD_SIZE: usize = FILE_OFFSET + FILE_LEN;

const _: () = assert!(RECORD_SIZE == 148);
