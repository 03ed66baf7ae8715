//! Fault-core: recovery of crash traces written to flash by a board's fault
//! handler.
//!
//! When a board keeps faulting it usually stops answering on its serial port,
//! but the fault handler has already written a trace block into program flash.
//! This crate gets that block back out.
//!
//! # Architecture
//!
//! - **Record**: Fixed binary layout of the trace block, encode/decode
//! - **Scanner**: Finds the first valid block in a raw flash image
//! - **Device**: Serial port enumeration, mode classification, 1200 baud touch
//! - **Reset**: State machine and driver that reboot a board into its bootloader
//! - **Flash**: External flash reader (`bossac`) and the temporary image file
//! - **Recover**: Session tying port checks, download and scan together
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use fault_core::scanner::scan_file;
//!
//! match scan_file(std::path::Path::new("flash.bin")).expect("scan failed") {
//!     Some(found) => println!("{}", found.record),
//!     None => println!("no fault data"),
//! }
//! ```

pub mod config;
pub mod device;
pub mod events;
pub mod flash;
pub mod record;
pub mod recover;
pub mod reset;
pub mod scanner;

// Re-exports for convenience
pub use config::{ConfigError, FlashConfig, RecoveryConfig};
pub use device::{
    DeviceCatalog, DeviceError, DeviceIdentity, DeviceMode, DeviceObserver, PortFilter,
    SerialObserver, ThreadSleeper, TouchSignaler,
};
pub use events::{NullObserver, RecoveryEvent, RecoveryObserver, RecoveryPhase, TracingObserver};
pub use flash::{FlashError, FlashImage, FlashReader, FlashTool};
pub use record::{DecodeError, DiagnosticRecord, FaultCause};
pub use recover::{PreconditionError, RecoverSession};
pub use reset::{RecoveryDriver, ResetError, ResetOutcome, ResetState, RetryBudget};
pub use scanner::{ScanError, ScanMatch, scan, scan_file};
