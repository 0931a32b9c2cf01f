//! Whole-collection persistence on top of the secure store.
//!
//! Each collection is a JSON array under a fixed entry name. Reads fetch the
//! whole array; writes replace it. All mutations go through [`Collection::update`],
//! which holds the collection's write lock across read, mutate and write.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::secure_storage::{SecureKeyStorage, SecureKeyStorageExt};
use crate::Result;

/// Entry name of the payment code collection.
pub const PAYMENT_CODES: &str = "payment_codes";
/// Entry name of the payment chain collection.
pub const PAYMENT_CHAINS: &str = "payment_chains";
/// Entry name of the SSO session collection.
pub const SSO_SESSIONS: &str = "sso_sessions";

pub(crate) struct Collection<T, S: SecureKeyStorage> {
    storage: Arc<S>,
    name: &'static str,
    write_lock: Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

impl<T, S> Collection<T, S>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    S: SecureKeyStorage,
{
    pub(crate) fn new(storage: Arc<S>, name: &'static str) -> Self {
        Self {
            storage,
            name,
            write_lock: Mutex::new(()),
            _records: PhantomData,
        }
    }

    /// All records. A missing entry is an empty collection.
    pub(crate) async fn load(&self) -> Result<Vec<T>> {
        match self.storage.retrieve(self.name).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Read, mutate and write back under the write lock.
    ///
    /// Nothing is written when `mutate` fails.
    pub(crate) async fn update<R, F>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<T>) -> Result<R> + Send,
        R: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let result = mutate(&mut records)?;
        let bytes = serde_json::to_vec(&records)?;
        self.storage.upsert(self.name, &bytes).await?;
        debug!(collection = self.name, records = records.len(), "collection written");
        Ok(result)
    }

    /// Drop every record.
    pub(crate) async fn clear(&self) -> Result<usize> {
        self.update(|records| {
            let removed = records.len();
            records.clear();
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaycodeErrorCode;
    use crate::secure_storage::InMemoryKeyStorage;
    use crate::PaycodeError;

    #[tokio::test]
    async fn test_missing_entry_is_empty() {
        let storage = Arc::new(InMemoryKeyStorage::new());
        let collection: Collection<String, _> = Collection::new(storage, "things");
        assert!(collection.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let storage = Arc::new(InMemoryKeyStorage::new());
        let collection: Collection<String, _> = Collection::new(storage.clone(), "things");

        collection
            .update(|records| {
                records.push("a".to_string());
                Ok(())
            })
            .await
            .unwrap();

        let err = collection
            .update(|records| {
                records.push("b".to_string());
                Err::<(), _>(PaycodeError::invalid_format("rejected"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidFormat);
        assert_eq!(collection.load().await.unwrap(), vec!["a".to_string()]);

        assert_eq!(collection.clear().await.unwrap(), 1);
        assert!(collection.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let storage = Arc::new(InMemoryKeyStorage::new());
        let collection: Collection<String, _> = Collection::new(storage.clone(), "things");
        storage.set_fail_writes(true);

        let err = collection.update(|_| Ok(())).await.unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::Storage);
    }
}
