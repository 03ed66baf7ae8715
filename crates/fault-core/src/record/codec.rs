//! Fault trace block encoding and decoding.

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Record length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Unknown fault cause ordinal {0}")]
    UnknownCause(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the fault handler fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    None,
    Hung,
    HardFault,
    OutOfMemory,
}

impl FaultCause {
    /// Map a raw ordinal to a cause. Unknown ordinals are rejected.
    pub fn from_ordinal(value: u32) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(FaultCause::None),
            1 => Ok(FaultCause::Hung),
            2 => Ok(FaultCause::HardFault),
            3 => Ok(FaultCause::OutOfMemory),
            other => Err(DecodeError::UnknownCause(other)),
        }
    }

    pub fn ordinal(&self) -> u32 {
        match self {
            FaultCause::None => 0,
            FaultCause::Hung => 1,
            FaultCause::HardFault => 2,
            FaultCause::OutOfMemory => 3,
        }
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCause::None => write!(f, "NONE"),
            FaultCause::Hung => write!(f, "HUNG"),
            FaultCause::HardFault => write!(f, "HARDFAULT"),
            FaultCause::OutOfMemory => write!(f, "OUTOFMEMORY"),
        }
    }
}

/// Decoded fault trace block (148 bytes on flash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub magic: u32,
    pub marker: [u8; MARKER_LEN],
    pub cause: FaultCause,
    pub marker2: [u8; TAG_LEN],
    /// Non-zero if the handler interrupted a MARK update.
    pub is_corrupted: i32,
    pub marker3: [u8; TAG_LEN],
    /// Faults recorded since the last upload.
    pub failure_count: i32,
    pub marker4: [u8; TAG_LEN],
    pub line: i32,
    pub marker5: [u8; TAG_LEN],
    pub file: [u8; FILE_LEN],
}

impl DiagnosticRecord {
    pub const SIZE: usize = RECORD_SIZE;

    /// Build a record with the standard markers, the way the firmware writes it.
    ///
    /// `file` is truncated to leave room for the terminating NUL.
    pub fn new(
        cause: FaultCause,
        is_corrupted: i32,
        failure_count: i32,
        line: i32,
        file: &str,
    ) -> Self {
        let mut file_buf = [0u8; FILE_LEN];
        let name = file.as_bytes();
        let n = name.len().min(FILE_LEN - 1);
        file_buf[..n].copy_from_slice(&name[..n]);

        Self {
            magic: RECORD_MAGIC,
            marker: *RECORD_MARKER,
            cause,
            marker2: *CORRUPTED_MARKER,
            is_corrupted,
            marker3: *FAILNUM_MARKER,
            failure_count,
            marker4: *LINE_MARKER,
            line,
            marker5: *FILE_MARKER,
            file: file_buf,
        }
    }

    /// Decode a record from exactly `RECORD_SIZE` bytes.
    ///
    /// Marker contents are not checked here; see [`DiagnosticRecord::is_valid`].
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != RECORD_SIZE {
            return Err(DecodeError::LengthMismatch {
                expected: RECORD_SIZE,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        let marker = read_array::<MARKER_LEN>(&mut cursor)?;
        let cause = FaultCause::from_ordinal(cursor.read_u32::<LittleEndian>()?)?;
        let marker2 = read_array::<TAG_LEN>(&mut cursor)?;
        let is_corrupted = cursor.read_i32::<LittleEndian>()?;
        let marker3 = read_array::<TAG_LEN>(&mut cursor)?;
        let failure_count = cursor.read_i32::<LittleEndian>()?;
        let marker4 = read_array::<TAG_LEN>(&mut cursor)?;
        let line = cursor.read_i32::<LittleEndian>()?;
        let marker5 = read_array::<TAG_LEN>(&mut cursor)?;
        let file = read_array::<FILE_LEN>(&mut cursor)?;

        Ok(Self {
            magic,
            marker,
            cause,
            marker2,
            is_corrupted,
            marker3,
            failure_count,
            marker4,
            line,
            marker5,
            file,
        })
    }

    /// Serialize to the on-flash layout.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        LittleEndian::write_u32(&mut bytes[MAGIC_OFFSET..], self.magic);
        bytes[MARKER_OFFSET..CAUSE_OFFSET].copy_from_slice(&self.marker);
        LittleEndian::write_u32(&mut bytes[CAUSE_OFFSET..], self.cause.ordinal());
        bytes[MARKER2_OFFSET..CORRUPTED_OFFSET].copy_from_slice(&self.marker2);
        LittleEndian::write_i32(&mut bytes[CORRUPTED_OFFSET..], self.is_corrupted);
        bytes[MARKER3_OFFSET..FAILNUM_OFFSET].copy_from_slice(&self.marker3);
        LittleEndian::write_i32(&mut bytes[FAILNUM_OFFSET..], self.failure_count);
        bytes[MARKER4_OFFSET..LINE_OFFSET].copy_from_slice(&self.marker4);
        LittleEndian::write_i32(&mut bytes[LINE_OFFSET..], self.line);
        bytes[MARKER5_OFFSET..FILE_OFFSET].copy_from_slice(&self.marker5);
        bytes[FILE_OFFSET..].copy_from_slice(&self.file);
        bytes
    }

    /// Sentinel and primary marker both match.
    pub fn is_valid(&self) -> bool {
        self.magic == RECORD_MAGIC && &self.marker == RECORD_MARKER
    }

    /// Whether the four per-field markers hold their expected tags.
    pub fn secondary_markers_intact(&self) -> bool {
        &self.marker2 == CORRUPTED_MARKER
            && &self.marker3 == FAILNUM_MARKER
            && &self.marker4 == LINE_MARKER
            && self.marker5[..FILE_MARKER_LEN] == FILE_MARKER[..FILE_MARKER_LEN]
    }

    pub fn is_corrupted(&self) -> bool {
        self.is_corrupted != 0
    }

    /// Source file name, cut at the first NUL.
    pub fn file_name(&self) -> String {
        let end = self.file.iter().position(|&b| b == 0).unwrap_or(FILE_LEN);
        String::from_utf8_lossy(&self.file[..end]).into_owned()
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found fault data!")?;
        writeln!(f, "\tFault: {}", self.cause)?;
        writeln!(
            f,
            "\tFaulted during recording: {}",
            if self.is_corrupted() { "Yes" } else { "No" }
        )?;
        writeln!(f, "\tLine: {}", self.line)?;
        writeln!(f, "\tFile: {}", self.file_name())?;
        write!(f, "\tFailures since upload: {}", self.failure_count)
    }
}

/// Check the first four bytes of `data` against the sentinel.
///
/// Compares every byte regardless of earlier mismatches.
pub fn is_sentinel_match(data: &[u8]) -> bool {
    if data.len() < MAGIC_LEN {
        return false;
    }
    let expected = RECORD_MAGIC.to_le_bytes();
    let diff = data[..MAGIC_LEN]
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    diff == 0
}

/// Sentinel and primary marker match on raw bytes, before any decoding.
pub fn has_record_signature(data: &[u8]) -> bool {
    data.len() >= CAUSE_OFFSET
        && is_sentinel_match(data)
        && &data[MARKER_OFFSET..CAUSE_OFFSET] == RECORD_MARKER
}

fn read_array<const N: usize>(cursor: &mut Cursor<&[u8]>) -> Result<[u8; N], DecodeError> {
    let mut buf = [0u8; N];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = DiagnosticRecord::new(FaultCause::HardFault, 0, 7, 123, "sensor.cpp");
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), RECORD_SIZE);

        let parsed = DiagnosticRecord::decode(&bytes).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_valid());
        assert!(parsed.secondary_markers_intact());
    }

    #[test]
    fn test_layout_offsets() {
        let record = DiagnosticRecord::new(FaultCause::Hung, 1, 2, 3, "a.c");
        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..4], &[0xFA, 0xFA, 0xFE, 0xFE]);
        assert_eq!(&bytes[4..36], RECORD_MARKER);
        assert_eq!(LittleEndian::read_u32(&bytes[36..]), 1);
        assert_eq!(LittleEndian::read_i32(&bytes[48..]), 1);
        assert_eq!(LittleEndian::read_i32(&bytes[60..]), 2);
        assert_eq!(LittleEndian::read_i32(&bytes[72..]), 3);
        assert_eq!(&bytes[84..88], b"a.c\0");
    }

    #[test]
    fn test_unknown_cause_is_error() {
        let mut bytes = DiagnosticRecord::new(FaultCause::None, 0, 1, 1, "x.c").to_bytes();
        LittleEndian::write_u32(&mut bytes[CAUSE_OFFSET..], 4);
        match DiagnosticRecord::decode(&bytes) {
            Err(DecodeError::UnknownCause(4)) => {}
            other => panic!("expected UnknownCause, got {:?}", other),
        }
    }

    #[test]
    fn test_length_mismatch() {
        let bytes = [0u8; RECORD_SIZE - 1];
        assert!(matches!(
            DiagnosticRecord::decode(&bytes),
            Err(DecodeError::LengthMismatch { actual, .. }) if actual == RECORD_SIZE - 1
        ));
    }

    #[test]
    fn test_decode_ignores_markers() {
        let mut bytes = DiagnosticRecord::new(FaultCause::Hung, 0, 1, 10, "x.c").to_bytes();
        bytes[MARKER_OFFSET] = b'X';
        let parsed = DiagnosticRecord::decode(&bytes).unwrap();
        assert!(!parsed.is_valid());
    }

    #[test]
    fn test_file_name_stops_at_nul() {
        let mut record = DiagnosticRecord::new(FaultCause::None, 0, 0, 0, "");
        record.file[..7].copy_from_slice(b"main.c\0");
        record.file[7..12].copy_from_slice(b"junk!");
        assert_eq!(record.file_name(), "main.c");
    }

    #[test]
    fn test_file_name_truncated_to_field() {
        let long = "f".repeat(100);
        let record = DiagnosticRecord::new(FaultCause::None, 0, 0, 0, &long);
        assert_eq!(record.file_name().len(), FILE_LEN - 1);
    }

    #[test]
    fn test_file_marker_padding_ignored() {
        let mut bytes = DiagnosticRecord::new(FaultCause::Hung, 0, 1, 2, "a.c").to_bytes();
        bytes[MARKER5_OFFSET + 6] = 0xA5;
        bytes[MARKER5_OFFSET + 7] = 0x5A;
        let parsed = DiagnosticRecord::decode(&bytes).unwrap();
        assert!(parsed.secondary_markers_intact());

        bytes[MARKER5_OFFSET] = b'X';
        let parsed = DiagnosticRecord::decode(&bytes).unwrap();
        assert!(!parsed.secondary_markers_intact());
    }

    #[test]
    fn test_sentinel_match() {
        assert!(is_sentinel_match(&RECORD_MAGIC.to_le_bytes()));
        assert!(!is_sentinel_match(&RECORD_MAGIC.to_be_bytes()));
        assert!(!is_sentinel_match(&[0xFA, 0xFA, 0xFE]));
    }

    #[test]
    fn test_report_format() {
        let record = DiagnosticRecord::new(FaultCause::HardFault, 0, 3, 42, "main.c");
        let report = record.to_string();
        assert_eq!(
            report,
            "Found fault data!\n\tFault: HARDFAULT\n\tFaulted during recording: No\n\tLine: 42\n\tFile: main.c\n\tFailures since upload: 3"
        );
    }
}
