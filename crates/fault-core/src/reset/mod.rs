//! Bootloader reset: state machine and driver.

pub mod driver;
pub mod machine;

pub use driver::{RecoveryDriver, ResetError};
pub use machine::{Observation, ResetEvent, ResetOutcome, ResetState, RetryBudget};
