//! Shared helpers for paycode-lib integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use paycode_lib::{
    decode_payment_code, InMemoryKeyStorage, PaycodeConfig, PaycodeCoordinator, PaymentCode,
    PaymentCodeKeys, SsoChallenge,
};

/// A compact legacy code: "PM8T" followed by 60 alphanumeric characters.
pub const LEGACY_CODE: &str = "PM8TJSBiQmNQDwTogMAbyqJe2PE2kQXjtgh88MRTxsrnHC8zpEtJ8j7Aj628oUFk";

pub fn seeded_keys(seed: &str) -> PaymentCodeKeys {
    PaymentCodeKeys::from_seed(seed.as_bytes()).unwrap()
}

pub fn record_for(keys: &PaymentCodeKeys, label: &str) -> PaymentCode {
    let code = keys.payment_code();
    let decoded = decode_payment_code(&code).unwrap();
    PaymentCode::from_decoded(format!("id-{}", label), code, label, &decoded)
}

pub fn challenge(nonce: &str) -> SsoChallenge {
    SsoChallenge {
        challenge: format!("login-{}", nonce),
        service_name: "Example Exchange".to_string(),
        service_url: "https://login.example.com".to_string(),
        timestamp: 1_704_067_200_000,
        nonce: nonce.to_string(),
    }
}

pub fn coordinator() -> PaycodeCoordinator<InMemoryKeyStorage> {
    PaycodeCoordinator::new(Arc::new(InMemoryKeyStorage::new()), PaycodeConfig::default())
}
