//! Error types for counter control.
//!
//! `CounterError` is the single error type returned by every operation of the
//! counter contract. Variants fall into four groups:
//!
//! 1. **Grammar errors** - `MalformedToken`, `DuplicateKey`
//!    - Raised by the configuration-string tokenizer.
//! 2. **Schema errors** - `MissingRequiredKey`, `OutOfRangeValue`,
//!    `InvalidEnumValue`, `InvalidNumber`, `InconsistentChannelSelection`
//!    - Raised by per-operation validation. No instrument command has been
//!      issued when one of these is returned.
//! 3. **State errors** - `NotConnected`, `InvalidState`
//!    - The session is not in a state where the operation is legal.
//! 4. **Collaborator errors** - `TransportFailure`, `InvalidResponse`,
//!    `Configuration`, `Settings`
//!    - I/O failures are propagated unchanged; the contract never retries.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using [`CounterError`].
pub type CounterResult<T> = std::result::Result<T, CounterError>;

/// Boxed cause carried by [`CounterError::TransportFailure`].
pub type TransportCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Session lifecycle state, used in state-machine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection to the instrument.
    Closed,
    /// Connection established; operations are legal.
    Open,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Closed => "closed",
            SessionState::Open => "open",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for counter sessions.
#[derive(Error, Debug)]
pub enum CounterError {
    /// A configuration-string token is not of the form `key:value`.
    #[error("Malformed configuration token '{token}': expected key:value")]
    MalformedToken {
        /// The offending token, verbatim.
        token: String,
    },

    /// The same key appears more than once in one configuration string.
    #[error("Duplicate configuration key '{key}'")]
    DuplicateKey {
        /// The repeated key.
        key: String,
    },

    /// A key required by the operation schema is absent.
    #[error("{operation}: missing required key '{key}'")]
    MissingRequiredKey {
        /// Operation whose schema was applied.
        operation: &'static str,
        /// The required key (a pattern such as `trig<ch>` for trigger keys).
        key: String,
    },

    /// A numeric value lies outside its documented bounds.
    #[error("{key}: value '{value}' out of range ({min} to {max})")]
    OutOfRangeValue {
        /// Offending key.
        key: String,
        /// Raw value as supplied.
        value: String,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },

    /// A value is not a member of the key's enumerated set.
    #[error("{key}: invalid value '{value}', expected one of: {expected}")]
    InvalidEnumValue {
        /// Offending key.
        key: String,
        /// Raw value as supplied.
        value: String,
        /// Human-readable list of accepted values.
        expected: String,
    },

    /// A numeric key carries text that is not a number.
    #[error("{key}: '{value}' is not a valid number")]
    InvalidNumber {
        /// Offending key.
        key: String,
        /// Raw value as supplied.
        value: String,
    },

    /// An explicit channel disagrees with the channel derived from another key.
    #[error("Inconsistent channel selection: {reason}")]
    InconsistentChannelSelection {
        /// Description of the conflicting keys.
        reason: String,
    },

    /// The operation requires an open session.
    #[error("Instrument '{port}' is not connected")]
    NotConnected {
        /// Port identifier of the session.
        port: String,
    },

    /// A lifecycle transition was requested from the wrong state.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Requested transition (`open` or `close`).
        operation: &'static str,
        /// Current state.
        state: SessionState,
    },

    /// The transport collaborator reported an I/O error.
    #[error("Transport failure on '{port}': {source}")]
    TransportFailure {
        /// Port identifier of the session.
        port: String,
        /// Underlying cause.
        #[source]
        source: TransportCause,
    },

    /// The instrument answered with text that could not be interpreted.
    #[error("Invalid instrument response to '{command}': '{response}'")]
    InvalidResponse {
        /// Command or query that produced the response.
        command: String,
        /// Raw response text.
        response: String,
    },

    /// Session settings parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Session settings could not be extracted from their sources.
    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),
}

impl CounterError {
    /// Wrap a transport-level error for the given port.
    pub fn transport(port: impl Into<String>, source: impl Into<TransportCause>) -> Self {
        Self::TransportFailure {
            port: port.into(),
            source: source.into(),
        }
    }

    /// Build an [`CounterError::OutOfRangeValue`].
    pub fn out_of_range(key: &str, value: &str, min: f64, max: f64) -> Self {
        Self::OutOfRangeValue {
            key: key.to_string(),
            value: value.to_string(),
            min,
            max,
        }
    }

    /// Build an [`CounterError::InvalidEnumValue`].
    pub fn invalid_enum(key: &str, value: &str, expected: &[&str]) -> Self {
        Self::InvalidEnumValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }

    /// Build an [`CounterError::InvalidNumber`].
    pub fn invalid_number(key: &str, value: &str) -> Self {
        Self::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// True for grammar and schema errors raised before any instrument I/O.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken { .. }
                | Self::DuplicateKey { .. }
                | Self::MissingRequiredKey { .. }
                | Self::OutOfRangeValue { .. }
                | Self::InvalidEnumValue { .. }
                | Self::InvalidNumber { .. }
                | Self::InconsistentChannelSelection { .. }
        )
    }

    /// True if the error came from the transport collaborator.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }
}

impl From<figment::Error> for CounterError {
    fn from(err: figment::Error) -> Self {
        Self::Settings(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        let err = CounterError::MalformedToken {
            token: "ch1".into(),
        };
        assert!(err.is_validation_error());
        assert!(!err.is_transport_failure());

        let err = CounterError::NotConnected {
            port: "/dev/usbtmc0".into(),
        };
        assert!(!err.is_validation_error());
    }

    #[test]
    fn test_transport_failure_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err = CounterError::transport("10.0.0.5", io);
        assert!(err.is_transport_failure());

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("read timed out"));
        assert!(err.to_string().contains("10.0.0.5"));
    }

    #[test]
    fn test_out_of_range_message() {
        let err = CounterError::out_of_range("res", "20", 5.0, 15.0);
        assert_eq!(err.to_string(), "res: value '20' out of range (5 to 15)");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = CounterError::InvalidState {
            operation: "open",
            state: SessionState::Open,
        };
        assert_eq!(err.to_string(), "Cannot open while session is open");
    }
}
