//! One-time notification references between two payment codes.
//!
//! The blinding key is the chain tweak at the reserved
//! [`NOTIFICATION_INDEX`], so only the two parties to the shared secret can
//! compute or check a reference:
//!
//! ```text
//! t*        = HMAC-SHA256(recipient_chain_code, S.x || be32(0xFFFFFFFF))
//! reference = HMAC-SHA256(t*, sender_public_key || be64(nonce))
//! ```

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

use crate::chain::{blinding_bytes, shared_secret, NOTIFICATION_INDEX};
use crate::codec::{self, DecodedPaymentCode};
use crate::keys::PaymentCodeKeys;
use crate::models::{NotificationReference, PaymentCode};
use crate::{PaycodeError, Result};

static LAST_NONCE: AtomicI64 = AtomicI64::new(0);

/// Current time in milliseconds, strictly greater than any earlier nonce of this process.
fn fresh_nonce(now: DateTime<Utc>) -> i64 {
    let now_ms = now.timestamp_millis();
    let mut last = LAST_NONCE.load(Ordering::SeqCst);
    loop {
        let next = now_ms.max(last + 1);
        match LAST_NONCE.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

fn reference_bytes(
    shared_x: &[u8; 32],
    recipient_chain_code: &[u8; 32],
    sender: &DecodedPaymentCode,
    nonce: i64,
) -> Result<[u8; 32]> {
    let blinding = blinding_bytes(shared_x, recipient_chain_code, NOTIFICATION_INDEX)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&blinding[..])
        .map_err(|e| PaycodeError::Internal(e.to_string()))?;
    mac.update(&sender.public_key_bytes());
    mac.update(&nonce.to_be_bytes());
    Ok(mac.finalize().into_bytes().into())
}

/// Build a fresh notification reference from `sender` to `recipient_code`.
///
/// # Errors
/// - `InvalidFormat` / `InvalidEncoding` for a bad or compact legacy recipient code
/// - `SigningUnavailable` when `sender_keys` are not the keys of `sender`
#[instrument(skip_all, fields(sender_id = %sender.id))]
pub fn build_notification_reference(
    sender: &PaymentCode,
    sender_keys: &PaymentCodeKeys,
    recipient_code: &str,
) -> Result<NotificationReference> {
    let now = Utc::now();
    build_notification_reference_with_nonce(sender, sender_keys, recipient_code, fresh_nonce(now))
}

/// Build the notification reference for an explicit nonce.
pub fn build_notification_reference_with_nonce(
    sender: &PaymentCode,
    sender_keys: &PaymentCodeKeys,
    recipient_code: &str,
    nonce: i64,
) -> Result<NotificationReference> {
    let recipient = codec::decode_recipient_code(recipient_code)?;
    let sender_decoded = sender.key_material()?;
    if !sender_keys.belongs_to(&sender_decoded) {
        return Err(PaycodeError::signing_unavailable(format!(
            "keys do not belong to payment code {}",
            sender.id
        )));
    }

    let shared = shared_secret(sender_keys.secret_key(), &recipient.public_key);
    let reference = reference_bytes(&shared, &recipient.chain_code, &sender_decoded, nonce)?;
    debug!(nonce, "built notification reference");

    Ok(NotificationReference {
        reference: hex::encode(reference),
        nonce,
        created_at: Utc::now(),
    })
}

/// Recipient side: check that `reference` was built by `sender_code` towards
/// the code of `recipient_keys`.
///
/// A malformed reference is reported as `false`.
pub fn verify_notification_reference(
    recipient_keys: &PaymentCodeKeys,
    sender_code: &str,
    reference: &NotificationReference,
) -> Result<bool> {
    let sender = codec::decode_payment_code(sender_code)?;
    let shared = shared_secret(recipient_keys.secret_key(), &sender.public_key);
    let expected = reference_bytes(
        &shared,
        recipient_keys.chain_code(),
        &sender,
        reference.nonce,
    )?;

    let presented = match hex::decode(&reference.reference) {
        Ok(bytes) if bytes.len() == expected.len() => bytes,
        _ => return Ok(false),
    };
    Ok(bool::from(expected[..].ct_eq(&presented[..])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaycodeErrorCode;
    use crate::test_utils::{alice_keys, bob_keys, owned_code_record, TestFixtures};

    #[test]
    fn test_recipient_verifies_reference() {
        let alice = alice_keys();
        let bob = bob_keys();
        let alice_code = owned_code_record(&alice, "Alice");

        let reference =
            build_notification_reference(&alice_code, &alice, &bob.payment_code()).unwrap();
        assert_eq!(reference.reference.len(), 64);
        assert!(verify_notification_reference(&bob, &alice_code.code, &reference).unwrap());

        // A third party holds a different secret.
        let carol = PaymentCodeKeys::from_seed(b"carol").unwrap();
        assert!(!verify_notification_reference(&carol, &alice_code.code, &reference).unwrap());
    }

    #[test]
    fn test_references_are_fresh() {
        let alice = alice_keys();
        let alice_code = owned_code_record(&alice, "Alice");
        let bob_code = bob_keys().payment_code();

        let first = build_notification_reference(&alice_code, &alice, &bob_code).unwrap();
        let second = build_notification_reference(&alice_code, &alice, &bob_code).unwrap();
        assert!(second.nonce > first.nonce);
        assert_ne!(first.reference, second.reference);
    }

    #[test]
    fn test_fixed_nonce_is_deterministic() {
        let alice = alice_keys();
        let alice_code = owned_code_record(&alice, "Alice");
        let bob_code = bob_keys().payment_code();

        let a = build_notification_reference_with_nonce(&alice_code, &alice, &bob_code, 42).unwrap();
        let b = build_notification_reference_with_nonce(&alice_code, &alice, &bob_code, 42).unwrap();
        assert_eq!(a.reference, b.reference);
    }

    #[test]
    fn test_tampered_reference_fails() {
        let alice = alice_keys();
        let bob = bob_keys();
        let alice_code = owned_code_record(&alice, "Alice");

        let mut reference =
            build_notification_reference(&alice_code, &alice, &bob.payment_code()).unwrap();
        reference.nonce += 1;
        assert!(!verify_notification_reference(&bob, &alice_code.code, &reference).unwrap());

        reference.reference = "zz".to_string();
        assert!(!verify_notification_reference(&bob, &alice_code.code, &reference).unwrap());
    }

    #[test]
    fn test_legacy_recipient_is_refused() {
        let alice = alice_keys();
        let alice_code = owned_code_record(&alice, "Alice");
        let err = build_notification_reference(&alice_code, &alice, TestFixtures::LEGACY_CODE)
            .unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidFormat);
    }

    #[test]
    fn test_foreign_keys_are_rejected() {
        let alice_code = owned_code_record(&alice_keys(), "Alice");
        let bob = bob_keys();
        let err =
            build_notification_reference(&alice_code, &bob, &bob.payment_code()).unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::SigningUnavailable);
    }
}
