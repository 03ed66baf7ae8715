//! Bounded-retry bootloader reset.

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::machine::{
    Observation, ResetEvent, ResetOutcome, ResetState, RetryBudget, locate_recovery,
};
use crate::device::{DeviceError, DeviceObserver, PortFilter, ResetSignaler, Sleeper};
use crate::events::{NullObserver, RecoveryEvent, RecoveryObserver, RecoveryPhase};

#[derive(Error, Debug)]
pub enum ResetError {
    #[error("Failed to find a device on port \"{port}\". Use --force to override this error.")]
    DeviceNotFound { port: String },

    #[error("Device on port \"{port}\" is already in bootloader mode. Use --force to override this error.")]
    AlreadyInRecovery { port: String },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Drives a board from its sketch into the bootloader.
pub struct RecoveryDriver<'a, D: DeviceObserver, S: ResetSignaler, W: Sleeper> {
    devices: &'a D,
    signaler: &'a S,
    sleeper: &'a W,
    events: &'a dyn RecoveryObserver,
    budget: RetryBudget,
    force: bool,
}

impl<'a, D: DeviceObserver, S: ResetSignaler, W: Sleeper> RecoveryDriver<'a, D, S, W> {
    pub fn new(devices: &'a D, signaler: &'a S, sleeper: &'a W, budget: RetryBudget) -> Self {
        Self {
            devices,
            signaler,
            sleeper,
            events: &NullObserver,
            budget,
            force: false,
        }
    }

    /// Report progress to `events`.
    pub fn with_observer(mut self, events: &'a dyn RecoveryObserver) -> Self {
        self.events = events;
        self
    }

    /// Skip port checks and accept a vanished port as success.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The port must hold a board running its sketch.
    pub fn check_preconditions(&self, port: &str) -> Result<(), ResetError> {
        let device = self
            .devices
            .find(port)?
            .ok_or_else(|| ResetError::DeviceNotFound {
                port: port.to_string(),
            })?;

        if device.is_recovery() {
            return Err(ResetError::AlreadyInRecovery {
                port: port.to_string(),
            });
        }
        Ok(())
    }

    /// Run until the board reaches the bootloader or the budget runs out.
    #[instrument(skip(self), fields(attempts = self.budget.attempts, force = self.force))]
    pub fn run(&self, port: &str) -> Result<ResetOutcome, ResetError> {
        if !self.force {
            self.check_preconditions(port)?;
        }
        self.emit(RecoveryEvent::PhaseChanged {
            from: RecoveryPhase::Precondition,
            to: RecoveryPhase::Reset,
        });

        let mut state = ResetState::Idle.next(ResetEvent::Start, &self.budget);

        loop {
            state = match state {
                ResetState::Signaling { attempt } => {
                    self.emit(RecoveryEvent::AttemptStarted {
                        attempt,
                        max: self.budget.attempts,
                        port: port.to_string(),
                    });
                    self.signaler.signal(port)?;
                    self.emit(RecoveryEvent::SignalSent {
                        port: port.to_string(),
                    });
                    ResetState::Signaling { attempt }.next(ResetEvent::Signaled, &self.budget)
                }
                ResetState::Observing { attempt } => {
                    self.sleeper.sleep(self.budget.attempt_wait());
                    let observation = self.observe(port)?;
                    ResetState::Observing { attempt }
                        .next(ResetEvent::Observed(observation), &self.budget)
                }
                ResetState::Retrying { attempt } => {
                    warn!(attempt, "Board did not reset, retrying");
                    ResetState::Retrying { attempt }.next(ResetEvent::Retry, &self.budget)
                }
                terminal => {
                    // Idle never survives Start, so only terminal states reach here.
                    if let Some(outcome) = terminal.outcome() {
                        self.report(&outcome);
                        return Ok(outcome);
                    }
                    terminal
                }
            };
        }
    }

    fn observe(&self, port: &str) -> Result<Observation, ResetError> {
        match self.devices.find(port)? {
            Some(device) => {
                self.emit(RecoveryEvent::DeviceObserved {
                    port: device.port.clone(),
                    mode: Some(device.mode),
                });
                if device.is_recovery() {
                    Ok(Observation::RecoveryAt(device.port))
                } else {
                    Ok(Observation::StillNormal)
                }
            }
            None => {
                self.emit(RecoveryEvent::DeviceObserved {
                    port: port.to_string(),
                    mode: None,
                });
                if self.force {
                    return Ok(Observation::Vanished);
                }

                self.emit(RecoveryEvent::Settling {
                    millis: self.budget.settle_ms,
                });
                self.sleeper.sleep(self.budget.settle());

                let all = self.devices.visible(&PortFilter::Any)?;
                Ok(match locate_recovery(port, &all) {
                    Some(device) => Observation::RecoveryAt(device.port.clone()),
                    None => Observation::Lost,
                })
            }
        }
    }

    fn report(&self, outcome: &ResetOutcome) {
        match outcome {
            ResetOutcome::Succeeded { attempts, port } => {
                info!(attempts, port = ?port, "Board reset into bootloader");
                self.emit(RecoveryEvent::Complete);
            }
            ResetOutcome::Exhausted { attempts } => {
                debug!(attempts, "Board failed to reset");
            }
            ResetOutcome::AmbiguousLoss { attempts } => {
                warn!(attempts, "Port disappeared but no bootloader port was found");
            }
        }
    }

    fn emit(&self, event: RecoveryEvent) {
        self.events.on_event(&event);
    }
}
