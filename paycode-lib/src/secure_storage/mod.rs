//! Secure key-value storage abstraction.
//!
//! The payment code core persists everything through this trait: the three
//! record collections and the per-code secret key material. The in-memory
//! implementation serves tests; applications plug in their platform keychain
//! or an encrypted file store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paycode_lib::secure_storage::{InMemoryKeyStorage, SecureKeyStorage, StoreOptions};
//!
//! let storage = InMemoryKeyStorage::new();
//! storage.store("payment_codes", b"[]", StoreOptions::new()).await?;
//! let bytes = storage.retrieve("payment_codes").await?;
//! ```

mod memory;
mod traits;

pub use memory::InMemoryKeyStorage;
pub use traits::{
    SecureKeyStorage, SecureKeyStorageExt, SecureStorageError, SecureStorageErrorCode,
    SecureStorageResult, StoreOptions,
};
