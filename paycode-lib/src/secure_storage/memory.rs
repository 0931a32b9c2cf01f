//! In-memory secure storage implementation.
//!
//! This implementation is for testing and development only. Values are not
//! encrypted and are lost when the process exits.
//!
//! # Thread Safety
//!
//! Access goes through an `RwLock`. Lock poisoning is reported as an error
//! rather than a panic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::traits::{
    SecureKeyStorage, SecureStorageError, SecureStorageErrorCode, SecureStorageResult,
    StoreOptions,
};

/// In-memory implementation of [`SecureKeyStorage`].
pub struct InMemoryKeyStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

fn lock_error(context: &str) -> SecureStorageError {
    SecureStorageError::new(
        SecureStorageErrorCode::Internal,
        format!("InMemoryKeyStorage: lock poisoned during {}", context),
    )
}

impl InMemoryKeyStorage {
    /// Create a new in-memory storage.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with an I/O error.
    ///
    /// Used to check that callers propagate storage failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Get the number of stored entries.
    ///
    /// Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> SecureStorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SecureStorageError::io("simulated write failure"));
        }
        Ok(())
    }
}

impl Default for InMemoryKeyStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureKeyStorage for InMemoryKeyStorage {
    async fn store(
        &self,
        key_id: &str,
        data: &[u8],
        options: StoreOptions,
    ) -> SecureStorageResult<()> {
        self.check_writable()?;
        let mut entries = self.entries.write().map_err(|_| lock_error("store"))?;

        if entries.contains_key(key_id) && !options.overwrite {
            return Err(SecureStorageError::already_exists(key_id));
        }

        entries.insert(key_id.to_string(), data.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key_id: &str) -> SecureStorageResult<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| lock_error("retrieve"))?;
        Ok(entries.get(key_id).cloned())
    }

    async fn delete(&self, key_id: &str) -> SecureStorageResult<()> {
        self.check_writable()?;
        let mut entries = self.entries.write().map_err(|_| lock_error("delete"))?;

        if entries.remove(key_id).is_some() {
            Ok(())
        } else {
            Err(SecureStorageError::not_found(key_id))
        }
    }

    async fn exists(&self, key_id: &str) -> SecureStorageResult<bool> {
        let entries = self.entries.read().map_err(|_| lock_error("exists"))?;
        Ok(entries.contains_key(key_id))
    }

    async fn list_keys(&self) -> SecureStorageResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| lock_error("list_keys"))?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_storage::SecureKeyStorageExt;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let storage = InMemoryKeyStorage::new();

        storage
            .store("payment_codes", b"[]", StoreOptions::new())
            .await
            .unwrap();

        let retrieved = storage.retrieve("payment_codes").await.unwrap();
        assert_eq!(retrieved, Some(b"[]".to_vec()));
    }

    #[tokio::test]
    async fn test_no_overwrite() {
        let storage = InMemoryKeyStorage::new();

        storage.store("k", b"first", StoreOptions::new()).await.unwrap();
        let result = storage.store("k", b"second", StoreOptions::new()).await;
        assert_eq!(
            result.unwrap_err().code,
            SecureStorageErrorCode::AlreadyExists
        );

        storage.upsert("k", b"second").await.unwrap();
        assert_eq!(storage.retrieve("k").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_none() {
        let storage = InMemoryKeyStorage::new();
        assert_eq!(storage.retrieve("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_and_delete_if_exists() {
        let storage = InMemoryKeyStorage::new();

        assert!(storage.delete("missing").await.is_err());
        storage.delete_if_exists("missing").await.unwrap();

        storage.upsert("k", b"data").await.unwrap();
        storage.delete("k").await.unwrap();
        assert!(!storage.exists("k").await.unwrap());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_simulated_write_failure() {
        let storage = InMemoryKeyStorage::new();
        storage.set_fail_writes(true);

        let err = storage.upsert("k", b"data").await.unwrap_err();
        assert_eq!(err.code, SecureStorageErrorCode::Io);

        storage.set_fail_writes(false);
        storage.upsert("k", b"data").await.unwrap();
        assert_eq!(storage.len(), 1);
    }
}
