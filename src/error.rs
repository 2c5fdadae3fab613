//! Error types for the esp32at-ble crate.

use thiserror::Error;

/// The main error type for this crate.
///
/// Every variant corresponds to one class of failure surfaced to the host
/// BLE API. Failures reported by the radio module driver never reach the
/// host directly; they are logged and mapped onto one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An allocation (queue slot or boxed request) could not be made.
    #[error("Out of memory")]
    NoMemory,

    /// The attribute table or the characteristic mirrors could not be allocated.
    #[error("Buffer overflow while building attribute table")]
    BufferOverflow,

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParam {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// A parameter lies outside the accepted range.
    #[error("Parameter out of range: {name} = {value}")]
    ParamOutOfRange {
        /// The name of the parameter.
        name: String,
        /// The offending value.
        value: String,
    },

    /// A radio module command failed.
    #[error("Invalid state: {operation} failed")]
    InvalidState {
        /// The operation that was attempted.
        operation: String,
    },

    /// The operation is not implemented by this stack.
    #[error("Operation not implemented: {operation}")]
    NotImplemented {
        /// Description of the unimplemented operation.
        operation: String,
    },

    /// No tokio runtime was available to drive the timeout timers.
    #[error("No tokio runtime available for timers")]
    RuntimeUnavailable,
}

impl Error {
    pub(crate) fn invalid_param(name: &str, value: impl std::fmt::Display) -> Self {
        Self::InvalidParam {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn out_of_range(name: &str, value: impl std::fmt::Display) -> Self {
        Self::ParamOutOfRange {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn invalid_state(operation: &str) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
        }
    }

    pub(crate) fn not_implemented(operation: &str) -> Self {
        Self::NotImplemented {
            operation: operation.to_string(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
