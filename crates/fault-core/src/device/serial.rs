//! Host serial port backend built on `serialport`.

use std::io::Write;
use std::time::Duration;

use serialport::{SerialPortType, available_ports};
use tracing::{debug, instrument, trace};

use super::catalog::{DeviceCatalog, DeviceIdentity, PortFilter};
use super::traits::{DeviceError, DeviceObserver, ResetSignaler};

/// Opening the CDC port at this rate asks the firmware to reboot into its
/// bootloader.
pub const TOUCH_BAUD_RATE: u32 = 1200;

/// Enumerates USB serial ports and keeps those in the catalog.
pub struct SerialObserver {
    catalog: DeviceCatalog,
}

impl SerialObserver {
    pub fn new(catalog: DeviceCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }
}

impl DeviceObserver for SerialObserver {
    #[instrument(level = "trace", skip(self))]
    fn visible(&self, filter: &PortFilter) -> Result<Vec<DeviceIdentity>, DeviceError> {
        let ports =
            available_ports().map_err(|e| DeviceError::EnumerationFailed(e.to_string()))?;

        let mut found = Vec::new();
        for info in ports {
            if !filter.matches(&info.port_name) {
                continue;
            }
            if let SerialPortType::UsbPort(usb) = &info.port_type
                && let Some(mode) = self.catalog.classify_usb(usb.vid, usb.pid)
            {
                trace!(
                    port = %info.port_name,
                    pid = %format!("{:04X}", usb.pid),
                    mode = %mode,
                    "Matched port"
                );
                found.push(DeviceIdentity {
                    port: info.port_name.clone(),
                    product_id: usb.pid,
                    mode,
                });
            }
        }

        Ok(found)
    }
}

/// Performs the 1200 baud touch.
pub struct TouchSignaler {
    timeout: Duration,
}

impl TouchSignaler {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(2),
        }
    }
}

impl Default for TouchSignaler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResetSignaler for TouchSignaler {
    #[instrument(level = "debug", skip(self))]
    fn signal(&self, port: &str) -> Result<(), DeviceError> {
        let line_err = |e: serialport::Error| DeviceError::SignalFailed {
            port: port.to_string(),
            message: e.to_string(),
        };

        // Dropping the handle closes the port on every return path.
        let mut handle = serialport::new(port, TOUCH_BAUD_RATE)
            .timeout(self.timeout)
            .open()
            .map_err(|e| DeviceError::OpenFailed {
                port: port.to_string(),
                message: e.to_string(),
            })?;

        handle.flush()?;
        handle.write_request_to_send(true).map_err(line_err)?;
        handle.flush()?;
        handle.write_data_terminal_ready(false).map_err(line_err)?;
        handle.flush()?;

        debug!(port, baud = TOUCH_BAUD_RATE, "Touch sequence sent");
        Ok(())
    }
}
