//! Unified error system for the CCV model
//!
//! A single error type shared by every crate in the workspace. Protocol
//! transitions carry their own typed precondition errors and convert into
//! this one at crate boundaries.

use serde::{Deserialize, Serialize};

/// Broad classification of a failure.
///
/// The protocol core has no fatal errors: every transition failure is a
/// precondition violation that the scheduler treats as "not enabled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The attempted transition is not enabled in the current state
    PreconditionViolated,
    /// Invalid input or configuration
    Invalid,
    /// Resource not found
    NotFound,
    /// Serialization or deserialization failed
    Serialization,
    /// Internal inconsistency
    Internal,
}

/// Unified error type for all CCV operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CcvError {
    /// A transition precondition does not hold
    #[error("Precondition violated: {message}")]
    PreconditionViolated {
        /// Which precondition failed
        message: String,
    },

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl CcvError {
    /// Create a precondition violation
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolated {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Prefix the message with additional context, keeping the error kind.
    pub fn with_context(self, context: impl AsRef<str>) -> Self {
        let context = context.as_ref();
        match self {
            Self::PreconditionViolated { message } => Self::PreconditionViolated {
                message: format!("{context}: {message}"),
            },
            Self::Invalid { message } => Self::Invalid {
                message: format!("{context}: {message}"),
            },
            Self::NotFound { message } => Self::NotFound {
                message: format!("{context}: {message}"),
            },
            Self::Serialization { message } => Self::Serialization {
                message: format!("{context}: {message}"),
            },
            Self::Internal { message } => Self::Internal {
                message: format!("{context}: {message}"),
            },
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PreconditionViolated { .. } => ErrorKind::PreconditionViolated,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Serialization { .. } => ErrorKind::Serialization,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Standard Result type for CCV operations
pub type Result<T> = std::result::Result<T, CcvError>;

impl From<serde_json::Error> for CcvError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CcvError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid(format!("invalid TOML: {err}"))
    }
}

impl From<std::io::Error> for CcvError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_error_creation() {
        let err = CcvError::invalid("test message");
        assert_matches!(err, CcvError::Invalid { .. });
        assert_eq!(err.to_string(), "Invalid: test message");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(CcvError::internal("broken").kind(), ErrorKind::Internal);
        assert_eq!(
            CcvError::precondition("x").kind(),
            ErrorKind::PreconditionViolated
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CcvError::from(io_err);
        assert_matches!(err, CcvError::NotFound { .. });

        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert_matches!(
            CcvError::from(json_err),
            CcvError::Serialization { .. }
        );
    }
}
