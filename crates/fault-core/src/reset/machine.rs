//! Reset state machine.
//!
//! Transitions are pure; the driver feeds in what it observed and acts on
//! the state it gets back.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceIdentity;

/// How many times to try, and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBudget {
    /// Maximum number of touch attempts.
    pub attempts: u32,
    /// Delay after each touch before looking for the board.
    pub attempt_wait_ms: u64,
    /// Extra delay for the bootloader to enumerate once the sketch port is gone.
    pub settle_ms: u64,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            attempts: 10,
            attempt_wait_ms: 1000,
            settle_ms: 1000,
        }
    }
}

impl RetryBudget {
    pub fn attempt_wait(&self) -> Duration {
        Duration::from_millis(self.attempt_wait_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// What the driver saw after one touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Original port still there, still running the sketch.
    StillNormal,
    /// A bootloader port is visible.
    RecoveryAt(String),
    /// Original port gone and checks are disabled.
    Vanished,
    /// Original port gone and no bootloader port turned up.
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetEvent {
    Start,
    Signaled,
    Observed(Observation),
    Retry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResetState {
    #[default]
    Idle,
    Signaling {
        attempt: u32,
    },
    Observing {
        attempt: u32,
    },
    Retrying {
        attempt: u32,
    },
    Succeeded {
        attempts: u32,
        /// Bootloader port, when one was seen.
        port: Option<String>,
    },
    Exhausted {
        attempts: u32,
    },
    AmbiguousLoss {
        attempts: u32,
    },
}

impl fmt::Display for ResetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetState::Idle => write!(f, "IDLE"),
            ResetState::Signaling { attempt } => write!(f, "SIGNALING({})", attempt),
            ResetState::Observing { attempt } => write!(f, "OBSERVING({})", attempt),
            ResetState::Retrying { attempt } => write!(f, "RETRYING({})", attempt),
            ResetState::Succeeded { .. } => write!(f, "SUCCEEDED"),
            ResetState::Exhausted { .. } => write!(f, "EXHAUSTED"),
            ResetState::AmbiguousLoss { .. } => write!(f, "AMBIGUOUS_LOSS"),
        }
    }
}

impl ResetState {
    /// Compute the next state. Events that do not apply leave the state as is.
    pub fn next(self, event: ResetEvent, budget: &RetryBudget) -> ResetState {
        match (self, event) {
            (ResetState::Idle, ResetEvent::Start) => {
                if budget.attempts == 0 {
                    ResetState::Exhausted { attempts: 0 }
                } else {
                    ResetState::Signaling { attempt: 1 }
                }
            }
            (ResetState::Signaling { attempt }, ResetEvent::Signaled) => {
                ResetState::Observing { attempt }
            }
            (ResetState::Observing { attempt }, ResetEvent::Observed(obs)) => match obs {
                Observation::RecoveryAt(port) => ResetState::Succeeded {
                    attempts: attempt,
                    port: Some(port),
                },
                Observation::Vanished => ResetState::Succeeded {
                    attempts: attempt,
                    port: None,
                },
                Observation::Lost => ResetState::AmbiguousLoss { attempts: attempt },
                Observation::StillNormal if attempt >= budget.attempts => {
                    ResetState::Exhausted { attempts: attempt }
                }
                Observation::StillNormal => ResetState::Retrying { attempt },
            },
            (ResetState::Retrying { attempt }, ResetEvent::Retry) => ResetState::Signaling {
                attempt: attempt + 1,
            },
            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResetState::Succeeded { .. }
                | ResetState::Exhausted { .. }
                | ResetState::AmbiguousLoss { .. }
        )
    }

    /// Final outcome, once terminal.
    pub fn outcome(&self) -> Option<ResetOutcome> {
        match self {
            ResetState::Succeeded { attempts, port } => Some(ResetOutcome::Succeeded {
                attempts: *attempts,
                port: port.clone(),
            }),
            ResetState::Exhausted { attempts } => Some(ResetOutcome::Exhausted {
                attempts: *attempts,
            }),
            ResetState::AmbiguousLoss { attempts } => Some(ResetOutcome::AmbiguousLoss {
                attempts: *attempts,
            }),
            _ => None,
        }
    }
}

/// How a reset run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Succeeded { attempts: u32, port: Option<String> },
    /// Every attempt left the board in its sketch.
    Exhausted { attempts: u32 },
    /// Port vanished but no bootloader appeared; needs the reset button.
    AmbiguousLoss { attempts: u32 },
}

impl ResetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ResetOutcome::Succeeded { .. })
    }
}

/// Where the board at `port` ended up, from a fresh device list.
pub fn locate_recovery<'a>(
    port: &str,
    devices: &'a [DeviceIdentity],
) -> Option<&'a DeviceIdentity> {
    devices
        .iter()
        .find(|d| d.port == port && d.is_recovery())
        .or_else(|| devices.iter().find(|d| d.is_recovery()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceMode;
    use crate::device::mock::identity;

    fn budget(attempts: u32) -> RetryBudget {
        RetryBudget {
            attempts,
            ..Default::default()
        }
    }

    #[test]
    fn test_happy_path() {
        let b = budget(3);
        let s = ResetState::Idle.next(ResetEvent::Start, &b);
        assert_eq!(s, ResetState::Signaling { attempt: 1 });
        let s = s.next(ResetEvent::Signaled, &b);
        assert_eq!(s, ResetState::Observing { attempt: 1 });
        let s = s.next(
            ResetEvent::Observed(Observation::RecoveryAt("COM5".into())),
            &b,
        );
        assert!(s.is_terminal());
        assert_eq!(
            s.outcome(),
            Some(ResetOutcome::Succeeded {
                attempts: 1,
                port: Some("COM5".into())
            })
        );
    }

    #[test]
    fn test_retry_until_exhausted() {
        let b = budget(2);
        let mut s = ResetState::Idle.next(ResetEvent::Start, &b);
        s = s.next(ResetEvent::Signaled, &b);
        s = s.next(ResetEvent::Observed(Observation::StillNormal), &b);
        assert_eq!(s, ResetState::Retrying { attempt: 1 });
        s = s.next(ResetEvent::Retry, &b);
        assert_eq!(s, ResetState::Signaling { attempt: 2 });
        s = s.next(ResetEvent::Signaled, &b);
        s = s.next(ResetEvent::Observed(Observation::StillNormal), &b);
        assert_eq!(s, ResetState::Exhausted { attempts: 2 });
    }

    #[test]
    fn test_zero_budget() {
        let s = ResetState::Idle.next(ResetEvent::Start, &budget(0));
        assert_eq!(s.outcome(), Some(ResetOutcome::Exhausted { attempts: 0 }));
    }

    #[test]
    fn test_vanished_and_lost() {
        let b = budget(5);
        let observing = ResetState::Observing { attempt: 2 };
        assert_eq!(
            observing
                .clone()
                .next(ResetEvent::Observed(Observation::Vanished), &b),
            ResetState::Succeeded {
                attempts: 2,
                port: None
            }
        );
        assert_eq!(
            observing.next(ResetEvent::Observed(Observation::Lost), &b),
            ResetState::AmbiguousLoss { attempts: 2 }
        );
    }

    #[test]
    fn test_unexpected_event_ignored() {
        let b = budget(1);
        let s = ResetState::Signaling { attempt: 1 };
        assert_eq!(s.clone().next(ResetEvent::Retry, &b), s);
        let done = ResetState::Exhausted { attempts: 1 };
        assert_eq!(done.clone().next(ResetEvent::Start, &b), done);
    }

    #[test]
    fn test_locate_prefers_same_port() {
        let devices = vec![
            identity("COM9", 0x000B, DeviceMode::Recovery),
            identity("COM3", 0x0015, DeviceMode::Recovery),
        ];
        assert_eq!(locate_recovery("COM3", &devices).unwrap().port, "COM3");
        assert_eq!(locate_recovery("COM1", &devices).unwrap().port, "COM9");
        let sketch = [identity("COM3", 0x800B, DeviceMode::Normal)];
        assert!(locate_recovery("COM3", &sketch).is_none());
    }
}
