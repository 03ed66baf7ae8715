//! USB identity tables and mode classification.
//!
//! A board presents one product ID while running a sketch and another while
//! its bootloader is active. The two sets must not overlap.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Adafruit Industries vendor ID.
pub const ADAFRUIT_VENDOR_ID: u16 = 0x239A;

/// Feather M0 product IDs while a sketch is running.
pub const SKETCH_PIDS: &[u16] = &[0x800B, 0x801B];

/// Feather M0 product IDs while the bootloader is running.
pub const BOOTLOADER_PIDS: &[u16] = &[0x000B, 0x0015, 0x001B];

/// Which firmware the board is currently presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Running the user sketch.
    Normal,
    /// Bootloader active; flash can be read and written.
    Recovery,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Normal => write!(f, "sketch"),
            DeviceMode::Recovery => write!(f, "bootloader"),
        }
    }
}

/// Known vendor and product IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCatalog {
    pub vendor_id: u16,
    pub normal_pids: Vec<u16>,
    pub recovery_pids: Vec<u16>,
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self {
            vendor_id: ADAFRUIT_VENDOR_ID,
            normal_pids: SKETCH_PIDS.to_vec(),
            recovery_pids: BOOTLOADER_PIDS.to_vec(),
        }
    }
}

impl DeviceCatalog {
    /// Classify a product ID. `None` means the ID is not in either set.
    pub fn classify(&self, pid: u16) -> Option<DeviceMode> {
        if self.normal_pids.contains(&pid) {
            Some(DeviceMode::Normal)
        } else if self.recovery_pids.contains(&pid) {
            Some(DeviceMode::Recovery)
        } else {
            None
        }
    }

    /// Classify a full VID/PID pair, rejecting foreign vendors.
    pub fn classify_usb(&self, vid: u16, pid: u16) -> Option<DeviceMode> {
        if vid != self.vendor_id {
            return None;
        }
        self.classify(pid)
    }

    /// Product IDs present in both sets.
    pub fn overlapping_pids(&self) -> Vec<u16> {
        self.normal_pids
            .iter()
            .copied()
            .filter(|pid| self.recovery_pids.contains(pid))
            .collect()
    }
}

/// One visible board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Serial port name (`/dev/ttyACM0`, `COM4`).
    pub port: String,
    pub product_id: u16,
    pub mode: DeviceMode,
}

impl DeviceIdentity {
    pub fn is_recovery(&self) -> bool {
        self.mode == DeviceMode::Recovery
    }
}

/// Port selection for enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortFilter {
    Exact(String),
    Any,
}

impl PortFilter {
    pub fn matches(&self, port: &str) -> bool {
        match self {
            PortFilter::Exact(name) => name == port,
            PortFilter::Any => true,
        }
    }
}
