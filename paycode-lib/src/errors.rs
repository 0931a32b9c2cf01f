//! Error types for payment code operations.
//!
//! Every failure in this crate is a data-validation failure or a policy
//! violation. None of them is transient, so nothing here is retried
//! automatically. Storage failures from the external store are carried through
//! unchanged.

use std::fmt;

use crate::secure_storage::SecureStorageError;

/// Error codes for FFI and mobile integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PaycodeErrorCode {
    /// Malformed payment code or challenge
    InvalidFormat = 1000,
    /// Payload is not valid for the expected base encoding
    InvalidEncoding = 1001,
    /// Record already exists
    AlreadyExists = 2000,
    /// Record is still referenced
    InUse = 2001,
    /// Record not found
    NotFound = 2002,
    /// Duplicate challenge for an active session
    ReplayDetected = 3000,
    /// Session is already revoked or expired
    AlreadyTerminal = 3001,
    /// Signature bundle does not match the challenge
    SignatureRejected = 3002,
    /// Required key material is missing
    SigningUnavailable = 4000,
    /// External storage failure
    Storage = 7000,
    /// Serialization error
    Serialization = 7001,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Comprehensive error type for payment code operations.
#[derive(Debug)]
pub enum PaycodeError {
    /// Malformed payment code, challenge or argument.
    InvalidFormat(String),

    /// Text is not valid for the expected base encoding.
    InvalidEncoding(String),

    /// A record with the same identity already exists.
    AlreadyExists {
        /// Type of resource (e.g., "payment code")
        resource_type: String,
        /// Resource identifier
        identifier: String,
    },

    /// The record is still referenced and cannot be removed.
    InUse {
        /// Resource identifier
        identifier: String,
        /// What still references it
        reason: String,
    },

    /// Resource not found.
    NotFound {
        /// Type of resource (e.g., "session", "payment chain")
        resource_type: String,
        /// Resource identifier
        identifier: String,
    },

    /// An active session already exists for this service and nonce.
    ReplayDetected {
        /// Service URL of the challenge
        service_url: String,
        /// Anti-replay nonce of the challenge
        nonce: String,
    },

    /// The session is already revoked or expired.
    AlreadyTerminal {
        /// Session identifier
        session_id: String,
        /// Terminal status the session is in
        status: String,
    },

    /// The signature bundle does not verify against the challenge it was issued for.
    SignatureRejected(String),

    /// Key material required for signing or derivation is missing.
    SigningUnavailable(String),

    /// External storage operation failed.
    Storage(SecureStorageError),

    /// Serialization/deserialization error.
    Serialization(String),

    /// Internal/unexpected error.
    Internal(String),
}

impl PaycodeError {
    /// Get the error code for FFI/mobile integration.
    pub fn code(&self) -> PaycodeErrorCode {
        match self {
            Self::InvalidFormat(_) => PaycodeErrorCode::InvalidFormat,
            Self::InvalidEncoding(_) => PaycodeErrorCode::InvalidEncoding,
            Self::AlreadyExists { .. } => PaycodeErrorCode::AlreadyExists,
            Self::InUse { .. } => PaycodeErrorCode::InUse,
            Self::NotFound { .. } => PaycodeErrorCode::NotFound,
            Self::ReplayDetected { .. } => PaycodeErrorCode::ReplayDetected,
            Self::AlreadyTerminal { .. } => PaycodeErrorCode::AlreadyTerminal,
            Self::SignatureRejected(_) => PaycodeErrorCode::SignatureRejected,
            Self::SigningUnavailable(_) => PaycodeErrorCode::SigningUnavailable,
            Self::Storage(_) => PaycodeErrorCode::Storage,
            Self::Serialization(_) => PaycodeErrorCode::Serialization,
            Self::Internal(_) => PaycodeErrorCode::Internal,
        }
    }

    /// Get the error message as an owned String (useful for FFI).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true for failures that indicate a possible attack rather than bad input.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::ReplayDetected { .. } | Self::SignatureRejected(_)
        )
    }

    /// Create an invalid format error.
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat(reason.into())
    }

    /// Create an invalid encoding error.
    pub fn invalid_encoding(reason: impl Into<String>) -> Self {
        Self::InvalidEncoding(reason.into())
    }

    /// Create a not found error.
    pub fn not_found(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Create an in-use error.
    pub fn in_use(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InUse {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a signing unavailable error.
    pub fn signing_unavailable(reason: impl Into<String>) -> Self {
        Self::SigningUnavailable(reason.into())
    }
}

impl fmt::Display for PaycodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            Self::InvalidEncoding(msg) => write!(f, "invalid encoding: {}", msg),
            Self::AlreadyExists {
                resource_type,
                identifier,
            } => {
                write!(f, "{} already exists: {}", resource_type, identifier)
            }
            Self::InUse { identifier, reason } => {
                write!(f, "{} is still in use: {}", identifier, reason)
            }
            Self::NotFound {
                resource_type,
                identifier,
            } => {
                write!(f, "{} not found: {}", resource_type, identifier)
            }
            Self::ReplayDetected { service_url, nonce } => {
                write!(
                    f,
                    "replay detected: an active session already exists for {} with nonce {}",
                    service_url, nonce
                )
            }
            Self::AlreadyTerminal { session_id, status } => {
                write!(f, "session {} is already {}", session_id, status)
            }
            Self::SignatureRejected(reason) => write!(f, "signature rejected: {}", reason),
            Self::SigningUnavailable(msg) => write!(f, "signing unavailable: {}", msg),
            Self::Storage(err) => write!(f, "storage error: {}", err),
            Self::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for PaycodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PaycodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<SecureStorageError> for PaycodeError {
    fn from(err: SecureStorageError) -> Self {
        Self::Storage(err)
    }
}
