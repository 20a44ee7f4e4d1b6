//! Trial executor traits.
//!
//! This module defines the [`TrialExecutor`] trait that all glitching backends must
//! implement. An executor owns every device detail: arming the glitch module,
//! resetting and re-synchronizing the target and reading back whatever it answers.
//! The engine only hands over an [`EncodedPoint`] and receives a [`RawSignal`].

use crate::classifier::RawSignal;
use crate::translator::EncodedPoint;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a trial executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The trial did not finish within its time limit.
    #[error("Trial timed out after {0:?}")]
    Timeout(Duration),
    /// A recoverable failure, e.g. a lost handshake. The trial may be repeated.
    #[error("Transient executor failure: {0}")]
    Transient(String),
    /// The device is unusable. Ends the session.
    #[error("Device fault: {0}")]
    DeviceFault(String),
}

impl ExecutorError {
    /// Whether the same trial may be attempted again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ExecutorError::DeviceFault(_))
    }
}

/// Trait for performing one physical glitch trial.
///
/// Implementors apply the encoded parameters to the glitch hardware, arm it, run
/// the target through its trigger sequence and report what came back. Trials are
/// strictly serialized; `execute` is never called concurrently on one executor.
///
/// Any `FnMut(&EncodedPoint, Duration) -> Result<RawSignal, ExecutorError>`
/// is an executor, which keeps test doubles short.
pub trait TrialExecutor {
    /// Performs one trial.
    ///
    /// # Arguments
    ///
    /// * `encoded` - Device-native parameters of the trial
    /// * `timeout` - Time the trial may take before it counts as failed
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Timeout`] or [`ExecutorError::Transient`] for
    /// failures worth retrying and [`ExecutorError::DeviceFault`] if the device
    /// can no longer be used.
    fn execute(
        &mut self,
        encoded: &EncodedPoint,
        timeout: Duration,
    ) -> Result<RawSignal, ExecutorError>;
}

impl<F> TrialExecutor for F
where
    F: FnMut(&EncodedPoint, Duration) -> Result<RawSignal, ExecutorError>,
{
    fn execute(
        &mut self,
        encoded: &EncodedPoint,
        timeout: Duration,
    ) -> Result<RawSignal, ExecutorError> {
        self(encoded, timeout)
    }
}
