//! Test utilities for payment code tests.
//!
//! Deterministic key fixtures for two parties, record builders and sample
//! challenges.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paycode_lib::test_utils::{alice_keys, bob_keys, owned_code_record};
//!
//! let alice = alice_keys();
//! let alice_code = owned_code_record(&alice, "Alice");
//! let chain = ChainDeriver::default()
//!     .derive_chain(&alice_code, &alice, &bob_keys().payment_code(), "Bob", 5)?;
//! ```

mod fixtures;

pub use fixtures::{
    alice_keys, bob_keys, in_memory_storage, owned_code_record, sample_challenge, TestFixtures,
};
