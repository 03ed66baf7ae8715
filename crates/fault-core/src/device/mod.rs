//! Device discovery and signalling.

pub mod catalog;
pub mod mock;
pub mod serial;
pub mod traits;

pub use catalog::{DeviceCatalog, DeviceIdentity, DeviceMode, PortFilter};
pub use mock::{MockObserver, MockSignaler, RecordingSleeper};
pub use serial::{SerialObserver, TouchSignaler};
pub use traits::{DeviceError, DeviceObserver, ResetSignaler, Sleeper, ThreadSleeper};
