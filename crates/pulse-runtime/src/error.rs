#![forbid(unsafe_code)]

//! Contract violations reported to the immediate caller.
//!
//! Faults raised by collaborator code during dispatch never surface here;
//! they are isolated as [`HandlerFault`](pulse_core::HandlerFault)s.

use std::time::Duration;

use thiserror::Error;

/// Misuse of a [`DelayedTrigger`](crate::DelayedTrigger).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// The delay cannot change while the trigger is active.
    #[error("delay cannot change while the trigger is active")]
    DelayWhileActive,

    /// The requested delay is longer than one day.
    #[error("delay {requested:?} is outside 0..={max:?}")]
    DelayOutOfRange {
        /// The rejected delay.
        requested: Duration,
        /// Largest accepted delay.
        max: Duration,
    },
}

impl TriggerError {
    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TriggerError::DelayWhileActive => "trigger_delay_while_active",
            TriggerError::DelayOutOfRange { .. } => "trigger_delay_out_of_range",
        }
    }
}

/// Malformed configuration value.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable held something other than the expected number.
    #[error("{var}={value:?} is not valid: {reason}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value read from the environment.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
}
