//! Reusable payment codes and hybrid challenge-response authentication.
//!
//! This crate derives one-time address chains between BIP47-style payment
//! codes over a genuine secp256k1 ECDH shared secret, builds notification
//! references, and signs authentication challenges with ECDSA alone or with
//! ECDSA and SPHINCS+ together. Persistence goes through the
//! [`SecureKeyStorage`](secure_storage::SecureKeyStorage) trait supplied by the
//! caller.
//!
//! # Features
//!
//! - **Payment codes**: canonical Base58Check codes and the compact legacy form
//! - **Address chains**: deterministic, append-only, bech32 P2WPKH per network
//! - **Hybrid signatures**: conjunctive ECDSA + SPHINCS+-SHA2-128f bundles
//! - **Sessions**: lazy expiry, irreversible revocation, replay rejection
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paycode_lib::prelude::*;
//!
//! let coordinator = PaycodeCoordinator::new(
//!     Arc::new(InMemoryKeyStorage::new()),
//!     PaycodeConfig::default(),
//! );
//! let alice = coordinator.registry().create_code("Alice").await?;
//! let chain = coordinator
//!     .derive_chain(&alice.id, "PM8T...", "Bob", None)
//!     .await?;
//! println!("first address: {}", chain.addresses[0].address);
//! ```

pub mod chain;
pub mod chain_store;
pub mod codec;
mod collection;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod keys;
pub mod models;
pub mod notification;
pub mod prelude;
pub mod registry;
pub mod secure_storage;
pub mod sessions;
pub mod signer;

/// Test fixtures for payment code tests.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chain::{ChainDeriver, MAX_CHAIN_LENGTH, NOTIFICATION_INDEX};
pub use chain_store::{AddressActivity, ChainStore};
pub use codec::{
    classify_scanned_payload, decode_payment_code, decode_recipient_code, encode_challenge_payload,
    encode_payment_code, DecodedPaymentCode, ScannedPayload,
};
pub use collection::{PAYMENT_CHAINS, PAYMENT_CODES, SSO_SESSIONS};
pub use config::{BitcoinNetwork, PaycodeConfig};
pub use coordinator::PaycodeCoordinator;
pub use errors::{PaycodeError, PaycodeErrorCode};
pub use keys::{KeyVault, PaymentCodeKeys, SphincsKeypair};
pub use models::{
    DerivedAddress, NotificationReference, PaymentChain, PaymentCode, SessionStatus, SsoChallenge,
    SsoSession,
};
pub use registry::Registry;
pub use secure_storage::{InMemoryKeyStorage, SecureKeyStorage, SecureStorageError};
pub use sessions::SessionStore;
pub use signer::{
    BundleParseError, SignatureAlgorithm, SignatureBundle, Verification, VerificationOutcome,
    VerificationReason,
};

/// Common result alias for payment code operations.
pub type Result<T> = std::result::Result<T, PaycodeError>;
