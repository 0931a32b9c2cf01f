//! Test fixtures and data generators.

use std::sync::Arc;

use crate::codec;
use crate::keys::PaymentCodeKeys;
use crate::models::{PaymentCode, SsoChallenge};
use crate::secure_storage::InMemoryKeyStorage;

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// A compact legacy payment code: the prefix plus 60 alphanumeric characters.
    pub const LEGACY_CODE: &'static str =
        "PM8TJSBiQmNQDwTogMAbyqJe2PE2kQXjtgh88MRTxsrnHC8zpEtJ8j7Aj628oUFk";

    /// Service used by sample challenges.
    pub const SERVICE_NAME: &'static str = "Example Exchange";

    /// Service URL used by sample challenges.
    pub const SERVICE_URL: &'static str = "https://login.example.com";

    /// Fixed challenge issuance time (2024-01-01T00:00:00Z in milliseconds).
    pub const CHALLENGE_TIMESTAMP: i64 = 1_704_067_200_000;
}

/// Deterministic keys of the first party. No SPHINCS+ keypair.
pub fn alice_keys() -> PaymentCodeKeys {
    PaymentCodeKeys::from_seed(b"paycode fixture seed: alice").expect("fixture seed is valid")
}

/// Deterministic keys of the second party. No SPHINCS+ keypair.
pub fn bob_keys() -> PaymentCodeKeys {
    PaymentCodeKeys::from_seed(b"paycode fixture seed: bob").expect("fixture seed is valid")
}

/// Registry record for the canonical code of `keys`.
pub fn owned_code_record(keys: &PaymentCodeKeys, label: &str) -> PaymentCode {
    let code = keys.payment_code();
    let decoded = codec::decode_payment_code(&code).expect("canonical code decodes");
    PaymentCode::from_decoded(uuid::Uuid::new_v4().to_string(), code, label, &decoded)
}

/// A challenge from the sample service with the given nonce.
pub fn sample_challenge(nonce: &str) -> SsoChallenge {
    SsoChallenge {
        challenge: format!("challenge-{}", nonce),
        service_name: TestFixtures::SERVICE_NAME.to_string(),
        service_url: TestFixtures::SERVICE_URL.to_string(),
        timestamp: TestFixtures::CHALLENGE_TIMESTAMP,
        nonce: nonce.to_string(),
    }
}

/// Fresh shared in-memory store.
pub fn in_memory_storage() -> Arc<InMemoryKeyStorage> {
    Arc::new(InMemoryKeyStorage::new())
}
