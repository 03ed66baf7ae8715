//! Mock device collaborators for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::catalog::{DeviceIdentity, DeviceMode, PortFilter};
use super::traits::{DeviceError, DeviceObserver, ResetSignaler, Sleeper};

/// Scripted observer: each `visible` call consumes one snapshot.
///
/// Once the script runs out the last snapshot keeps being returned.
pub struct MockObserver {
    snapshots: Arc<Mutex<VecDeque<Vec<DeviceIdentity>>>>,
    last: Arc<Mutex<Vec<DeviceIdentity>>>,
    /// Captured filters, one per call.
    queries: Arc<Mutex<Vec<PortFilter>>>,
}

impl MockObserver {
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(VecDeque::new())),
            last: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue the device list for the next call.
    pub fn push_snapshot(&self, devices: Vec<DeviceIdentity>) {
        self.snapshots.lock().unwrap().push_back(devices);
    }

    pub fn get_queries(&self) -> Vec<PortFilter> {
        self.queries.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl Default for MockObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceObserver for MockObserver {
    fn visible(&self, filter: &PortFilter) -> Result<Vec<DeviceIdentity>, DeviceError> {
        self.queries.lock().unwrap().push(filter.clone());

        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.snapshots.lock().unwrap().pop_front() {
            *last = next;
        }

        Ok(last
            .iter()
            .filter(|d| filter.matches(&d.port))
            .cloned()
            .collect())
    }
}

/// Records signalled ports. Can be told to fail.
pub struct MockSignaler {
    signals: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockSignaler {
    pub fn new() -> Self {
        Self {
            signals: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn get_signals(&self) -> Vec<String> {
        self.signals.lock().unwrap().clone()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.lock().unwrap().len()
    }

    /// Make subsequent signals fail to open the port.
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

impl Default for MockSignaler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResetSignaler for MockSignaler {
    fn signal(&self, port: &str) -> Result<(), DeviceError> {
        if *self.fail.lock().unwrap() {
            return Err(DeviceError::OpenFailed {
                port: port.to_string(),
                message: "mock failure".into(),
            });
        }
        self.signals.lock().unwrap().push(port.to_string());
        Ok(())
    }
}

/// Records requested delays without sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Shorthand for building test identities.
pub fn identity(port: &str, product_id: u16, mode: DeviceMode) -> DeviceIdentity {
    DeviceIdentity {
        port: port.to_string(),
        product_id,
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_observer_script() {
        let mock = MockObserver::new();
        mock.push_snapshot(vec![identity("COM3", 0x800B, DeviceMode::Normal)]);
        mock.push_snapshot(vec![identity("COM4", 0x000B, DeviceMode::Recovery)]);

        let first = mock.visible(&PortFilter::Any).unwrap();
        assert_eq!(first[0].port, "COM3");

        let filtered = mock.visible(&PortFilter::Exact("COM3".into())).unwrap();
        assert!(filtered.is_empty());

        // Script exhausted, last snapshot repeats
        let again = mock.find("COM4").unwrap().unwrap();
        assert!(again.is_recovery());
        assert_eq!(mock.query_count(), 3);
    }

    #[test]
    fn test_mock_signaler_failure() {
        let mock = MockSignaler::new();
        mock.signal("COM3").unwrap();
        mock.set_failing(true);
        assert!(mock.signal("COM3").is_err());
        assert_eq!(mock.get_signals(), vec!["COM3".to_string()]);
    }
}
