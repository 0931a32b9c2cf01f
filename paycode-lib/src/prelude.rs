//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use paycode_lib::prelude::*;
//! ```

// Records
pub use crate::models::{
    DerivedAddress, NotificationReference, PaymentChain, PaymentCode, SessionStatus, SsoChallenge,
    SsoSession,
};

// Error handling
pub use crate::errors::{PaycodeError, PaycodeErrorCode};
pub use crate::Result;

// Configuration
pub use crate::config::{BitcoinNetwork, PaycodeConfig};

// Components
pub use crate::chain::ChainDeriver;
pub use crate::chain_store::{AddressActivity, ChainStore};
pub use crate::coordinator::PaycodeCoordinator;
pub use crate::keys::{KeyVault, PaymentCodeKeys};
pub use crate::registry::Registry;
pub use crate::sessions::SessionStore;

// Encoding and signatures
pub use crate::codec::{classify_scanned_payload, ScannedPayload};
pub use crate::signer::{SignatureBundle, Verification, VerificationOutcome, VerificationReason};

// Secure storage
pub use crate::secure_storage::{InMemoryKeyStorage, SecureKeyStorage};
