//! Contract of the external secure key-value store.

use std::fmt;
use std::future::Future;

/// Error codes for secure storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SecureStorageErrorCode {
    /// Entry not found
    NotFound = 1000,
    /// Access denied (device locked, auth required)
    AccessDenied = 2000,
    /// Entry already exists
    AlreadyExists = 3000,
    /// Invalid entry key
    InvalidKey = 4000,
    /// Underlying I/O failed
    Io = 5000,
    /// Internal error
    Internal = 9999,
}

/// Error type for secure storage operations.
#[derive(Debug)]
pub struct SecureStorageError {
    /// Error code for FFI/mobile integration
    pub code: SecureStorageErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Entry key related to the error (if applicable)
    pub key_id: Option<String>,
}

impl SecureStorageError {
    /// Create a new error.
    pub fn new(code: SecureStorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            key_id: None,
        }
    }

    /// Create a "not found" error.
    pub fn not_found(key_id: impl Into<String>) -> Self {
        let key_id = key_id.into();
        Self {
            code: SecureStorageErrorCode::NotFound,
            message: format!("Entry not found: {}", key_id),
            key_id: Some(key_id),
        }
    }

    /// Create an "already exists" error.
    pub fn already_exists(key_id: impl Into<String>) -> Self {
        let key_id = key_id.into();
        Self {
            code: SecureStorageErrorCode::AlreadyExists,
            message: format!("Entry already exists: {}", key_id),
            key_id: Some(key_id),
        }
    }

    /// Create an I/O error.
    pub fn io(err: impl fmt::Display) -> Self {
        Self::new(SecureStorageErrorCode::Io, err.to_string())
    }

    /// Check if this error indicates the entry wasn't found.
    pub fn is_not_found(&self) -> bool {
        self.code == SecureStorageErrorCode::NotFound
    }
}

impl fmt::Display for SecureStorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key_id) = &self.key_id {
            write!(f, "{} (key: {})", self.message, key_id)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for SecureStorageError {}

/// Result type for secure storage operations.
pub type SecureStorageResult<T> = Result<T, SecureStorageError>;

/// Options for storing an entry.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Overwrite if the entry already exists
    pub overwrite: bool,
}

impl StoreOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow overwriting existing entries.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

/// Opaque secure key-value store.
///
/// The payment code core only ever reads whole values and writes whole values
/// back; implementations need no partial-update support. Implementations must:
/// - Encrypt values at rest where the platform allows it
/// - Never log stored values
/// - Report every failure; a silently dropped write corrupts the
///   append-only chain and session collections
pub trait SecureKeyStorage: Send + Sync {
    /// Store a value under `key_id`.
    ///
    /// # Errors
    /// - `AlreadyExists` if the entry exists and overwrite is false
    /// - `Io` if the backing medium fails
    fn store(
        &self,
        key_id: &str,
        data: &[u8],
        options: StoreOptions,
    ) -> impl Future<Output = SecureStorageResult<()>> + Send;

    /// Retrieve the value stored under `key_id`, or None if absent.
    fn retrieve(
        &self,
        key_id: &str,
    ) -> impl Future<Output = SecureStorageResult<Option<Vec<u8>>>> + Send;

    /// Delete the value stored under `key_id`.
    ///
    /// # Errors
    /// - `NotFound` if the entry doesn't exist
    fn delete(&self, key_id: &str) -> impl Future<Output = SecureStorageResult<()>> + Send;

    /// Check if an entry exists.
    fn exists(&self, key_id: &str) -> impl Future<Output = SecureStorageResult<bool>> + Send;

    /// List all stored entry keys.
    fn list_keys(&self) -> impl Future<Output = SecureStorageResult<Vec<String>>> + Send;
}

/// Convenience methods on top of [`SecureKeyStorage`].
pub trait SecureKeyStorageExt: SecureKeyStorage {
    /// Store or replace a value.
    fn upsert(
        &self,
        key_id: &str,
        data: &[u8],
    ) -> impl Future<Output = SecureStorageResult<()>> + Send {
        self.store(key_id, data, StoreOptions::new().overwrite())
    }

    /// Delete a value if it exists (no error if missing).
    fn delete_if_exists(
        &self,
        key_id: &str,
    ) -> impl Future<Output = SecureStorageResult<()>> + Send {
        async move {
            match self.delete(key_id).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e),
            }
        }
    }
}

impl<T: SecureKeyStorage> SecureKeyStorageExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SecureStorageError::not_found("payment_codes");
        assert!(err.is_not_found());
        assert_eq!(err.key_id, Some("payment_codes".to_string()));
        assert!(err.to_string().contains("payment_codes"));
    }

    #[test]
    fn test_store_options() {
        assert!(!StoreOptions::new().overwrite);
        assert!(StoreOptions::new().overwrite().overwrite);
    }
}
