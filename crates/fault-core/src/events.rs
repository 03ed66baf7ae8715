//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) follow reset and recovery progress
//! without the core printing anything itself.

use std::fmt;

use crate::device::DeviceMode;

/// Recovery phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    /// Checking the port before doing anything.
    Precondition,
    /// Rebooting the board into its bootloader.
    Reset,
    /// Reading flash with the external tool.
    Download,
    /// Searching the image for a trace block.
    Scan,
    Complete,
    Error,
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPhase::Precondition => write!(f, "Precondition"),
            RecoveryPhase::Reset => write!(f, "Reset"),
            RecoveryPhase::Download => write!(f, "Download"),
            RecoveryPhase::Scan => write!(f, "Scan"),
            RecoveryPhase::Complete => write!(f, "Complete"),
            RecoveryPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by the reset driver and the recover session.
#[derive(Debug, Clone)]
pub enum RecoveryEvent {
    PhaseChanged {
        from: RecoveryPhase,
        to: RecoveryPhase,
    },
    /// A reset attempt is starting.
    AttemptStarted { attempt: u32, max: u32, port: String },
    /// The 1200 baud touch completed.
    SignalSent { port: String },
    /// Result of looking for the board after a signal.
    DeviceObserved {
        port: String,
        mode: Option<DeviceMode>,
    },
    /// Original port vanished, waiting for the bootloader to enumerate.
    Settling { millis: u64 },
    /// External flash reader started.
    DownloadStarted { tool: String, port: String },
    DownloadFinished { bytes: usize },
    /// Scan finished; `offset` is `None` when nothing was found.
    ScanFinished { offset: Option<usize> },
    Complete,
}

/// Observer trait for receiving recovery events.
pub trait RecoveryObserver: Send + Sync {
    fn on_event(&self, event: &RecoveryEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl RecoveryObserver for NullObserver {
    fn on_event(&self, _event: &RecoveryEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl RecoveryObserver for TracingObserver {
    fn on_event(&self, event: &RecoveryEvent) {
        match event {
            RecoveryEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            RecoveryEvent::AttemptStarted { attempt, max, port } => {
                tracing::info!(attempt, max, port = %port, "Attempting to reset board");
            }
            RecoveryEvent::SignalSent { port } => {
                tracing::debug!(port = %port, "Reset signal sent");
            }
            RecoveryEvent::DeviceObserved { port, mode } => match mode {
                Some(mode) => tracing::debug!(port = %port, mode = %mode, "Device observed"),
                None => tracing::debug!(port = %port, "Device not visible"),
            },
            RecoveryEvent::Settling { millis } => {
                tracing::debug!(millis, "Port disappeared, waiting for bootloader");
            }
            RecoveryEvent::DownloadStarted { tool, port } => {
                tracing::info!(tool = %tool, port = %port, "Downloading flash");
            }
            RecoveryEvent::DownloadFinished { bytes } => {
                tracing::info!(bytes, "Flash downloaded");
            }
            RecoveryEvent::ScanFinished { offset } => match offset {
                Some(offset) => {
                    tracing::info!(offset = %format!("0x{:X}", offset), "Fault data located")
                }
                None => tracing::debug!("No fault data in image"),
            },
            RecoveryEvent::Complete => {
                tracing::debug!("Operation complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<String>>);

    impl RecoveryObserver for Collect {
        fn on_event(&self, event: &RecoveryEvent) {
            self.0.lock().unwrap().push(format!("{:?}", event));
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RecoveryPhase::Download.to_string(), "Download");
    }

    #[test]
    fn test_custom_observer() {
        let obs = Collect(Mutex::new(Vec::new()));
        obs.on_event(&RecoveryEvent::SignalSent { port: "COM3".into() });
        obs.on_event(&RecoveryEvent::Complete);
        let seen = obs.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("COM3"));
    }
}
