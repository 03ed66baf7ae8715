//! Device collaborator abstractions.
//!
//! The reset driver only talks to the host through these traits, so the
//! retry logic can be exercised with mocks and without real delays.

use std::time::Duration;

use thiserror::Error;

use super::catalog::{DeviceIdentity, PortFilter};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Port enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Failed to open {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Control line update failed on {port}: {message}")]
    SignalFailed { port: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lists boards currently attached to the host.
pub trait DeviceObserver {
    /// Boards matching `filter` whose IDs appear in the catalog.
    fn visible(&self, filter: &PortFilter) -> Result<Vec<DeviceIdentity>, DeviceError>;

    /// The board at `port`, if any.
    fn find(&self, port: &str) -> Result<Option<DeviceIdentity>, DeviceError> {
        Ok(self
            .visible(&PortFilter::Exact(port.to_string()))?
            .into_iter()
            .next())
    }
}

/// Sends the bootloader request to a board.
pub trait ResetSignaler {
    /// Open `port`, toggle the control lines, close it again.
    fn signal(&self, port: &str) -> Result<(), DeviceError>;
}

/// Blocking delay between steps.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real delay via `std::thread::sleep`.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
