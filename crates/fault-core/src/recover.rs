//! Recover session - pulls a fault trace off a board sitting in its bootloader.

use std::path::PathBuf;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::RecoveryConfig;
use crate::device::DeviceObserver;
use crate::events::{NullObserver, RecoveryEvent, RecoveryObserver, RecoveryPhase};
use crate::flash::{FlashImage, FlashReader};
use crate::scanner::{ScanMatch, scan};

/// Port checks that can be bypassed with `--force`.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("Failed to find a device on port \"{port}\". Use --force to override this error.")]
    DeviceNotFound { port: String },

    #[error("Device on port \"{port}\" is not in bootloader mode. Use --force to override this error.")]
    NotInRecovery { port: String },
}

/// One recover run: check port, download flash, scan.
pub struct RecoverSession<'a, D: DeviceObserver, R: FlashReader> {
    devices: &'a D,
    reader: &'a R,
    events: &'a dyn RecoveryObserver,
    image_path: PathBuf,
    force: bool,
}

impl<'a, D: DeviceObserver, R: FlashReader> RecoverSession<'a, D, R> {
    pub fn new(devices: &'a D, reader: &'a R, image_path: PathBuf) -> Self {
        Self {
            devices,
            reader,
            events: &NullObserver,
            image_path,
            force: false,
        }
    }

    /// Build from config; only the image path is taken from it.
    pub fn from_config(devices: &'a D, reader: &'a R, config: &RecoveryConfig) -> Self {
        Self::new(devices, reader, config.flash.image_path.clone())
    }

    pub fn with_observer(mut self, events: &'a dyn RecoveryObserver) -> Self {
        self.events = events;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn check_port(&self, port: &str) -> Result<()> {
        let device = self
            .devices
            .find(port)
            .context("Failed to enumerate serial ports")?
            .ok_or_else(|| PreconditionError::DeviceNotFound {
                port: port.to_string(),
            })?;

        if !device.is_recovery() {
            return Err(PreconditionError::NotInRecovery {
                port: port.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Run the session. `Ok(None)` means the image held no fault data.
    ///
    /// The temporary image is removed before this returns, on every path.
    #[instrument(skip(self), fields(image = %self.image_path.display()))]
    pub fn run(&self, port: &str) -> Result<Option<ScanMatch>> {
        if !self.force {
            self.check_port(port)?;
        }

        self.emit(RecoveryEvent::PhaseChanged {
            from: RecoveryPhase::Precondition,
            to: RecoveryPhase::Download,
        });
        self.emit(RecoveryEvent::DownloadStarted {
            tool: self.reader.name(),
            port: port.to_string(),
        });

        let image = FlashImage::new(self.image_path.clone());
        self.reader
            .download(port, image.path())
            .context("Download from flash failed!")?;
        let data = image.load().context("Failed to read flash image")?;
        self.emit(RecoveryEvent::DownloadFinished { bytes: data.len() });

        self.emit(RecoveryEvent::PhaseChanged {
            from: RecoveryPhase::Download,
            to: RecoveryPhase::Scan,
        });
        let found = scan(&data)?;
        self.emit(RecoveryEvent::ScanFinished {
            offset: found.as_ref().map(|m| m.offset),
        });

        if let Some(m) = &found {
            info!(offset = %format!("0x{:X}", m.offset), cause = %m.record.cause, "Found fault data");
            self.emit(RecoveryEvent::Complete);
        }
        Ok(found)
    }

    fn emit(&self, event: RecoveryEvent) {
        self.events.on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockObserver, identity};
    use crate::device::DeviceMode;
    use crate::flash::FlashError;
    use crate::record::{DiagnosticRecord, FaultCause};
    use std::path::Path;
    use std::sync::Mutex;

    /// Writes a canned image instead of talking to a board.
    struct CannedReader {
        image: Option<Vec<u8>>,
        ports: Mutex<Vec<String>>,
    }

    impl CannedReader {
        fn new(image: Option<Vec<u8>>) -> Self {
            Self {
                image,
                ports: Mutex::new(Vec::new()),
            }
        }
    }

    impl FlashReader for CannedReader {
        fn name(&self) -> String {
            "canned".into()
        }

        fn download(&self, port: &str, dest: &Path) -> Result<(), FlashError> {
            self.ports.lock().unwrap().push(port.to_string());
            match &self.image {
                Some(data) => Ok(std::fs::write(dest, data)?),
                None => Err(FlashError::DownloadFailed { code: Some(1) }),
            }
        }
    }

    fn image_with_record(offset: usize, record: &DiagnosticRecord) -> Vec<u8> {
        let mut data = vec![0xFFu8; offset];
        data.extend_from_slice(&record.to_bytes());
        data.extend_from_slice(&[0xFFu8; 256]);
        data
    }

    fn bootloader_on(port: &str) -> MockObserver {
        let devices = MockObserver::new();
        devices.push_snapshot(vec![identity(port, 0x0015, DeviceMode::Recovery)]);
        devices
    }

    #[test]
    fn test_recover_found() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("flash.bin");
        let record = DiagnosticRecord::new(FaultCause::OutOfMemory, 0, 9, 310, "alloc.cpp");
        let reader = CannedReader::new(Some(image_with_record(0x400, &record)));
        let devices = bootloader_on("COM7");

        let found = RecoverSession::new(&devices, &reader, image_path.clone())
            .run("COM7")
            .unwrap()
            .unwrap();

        assert_eq!(found.offset, 0x400);
        assert_eq!(found.record, record);
        assert!(!image_path.exists());
    }

    #[test]
    fn test_recover_not_found_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("flash.bin");
        let reader = CannedReader::new(Some(vec![0u8; 4096]));
        let devices = bootloader_on("COM7");

        let found = RecoverSession::new(&devices, &reader, image_path.clone())
            .run("COM7")
            .unwrap();
        assert!(found.is_none());
        assert!(!image_path.exists());
    }

    #[test]
    fn test_preconditions() {
        let dir = tempfile::tempdir().unwrap();
        let reader = CannedReader::new(Some(vec![0u8; 16]));

        let absent = MockObserver::new();
        let err = RecoverSession::new(&absent, &reader, dir.path().join("a.bin"))
            .run("COM7")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PreconditionError>(),
            Some(PreconditionError::DeviceNotFound { .. })
        ));

        let sketch = MockObserver::new();
        sketch.push_snapshot(vec![identity("COM7", 0x800B, DeviceMode::Normal)]);
        let err = RecoverSession::new(&sketch, &reader, dir.path().join("b.bin"))
            .run("COM7")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PreconditionError>(),
            Some(PreconditionError::NotInRecovery { .. })
        ));

        assert!(reader.ports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_force_skips_port_check() {
        let dir = tempfile::tempdir().unwrap();
        let record = DiagnosticRecord::new(FaultCause::Hung, 1, 2, 3, "loop.cpp");
        let reader = CannedReader::new(Some(image_with_record(0, &record)));
        let devices = MockObserver::new();

        let found = RecoverSession::new(&devices, &reader, dir.path().join("flash.bin"))
            .force(true)
            .run("/dev/ttyACM1")
            .unwrap();
        assert!(found.is_some());
        assert_eq!(devices.query_count(), 0);
    }

    #[test]
    fn test_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("flash.bin");
        let reader = CannedReader::new(None);
        let devices = bootloader_on("COM7");

        let err = RecoverSession::new(&devices, &reader, image_path.clone())
            .run("COM7")
            .unwrap_err();
        assert!(err.to_string().contains("Download from flash failed"));
        assert!(err.downcast_ref::<FlashError>().is_some());
        assert!(!image_path.exists());
    }
}
