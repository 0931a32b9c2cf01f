//! Payment code and QR payload encoding.
//!
//! Two payment code encodings are accepted on input:
//!
//! - **Canonical**: BIP47 v1, Base58Check with version byte `0x47` over an
//!   80-byte payload `[0x01, features, sign, x(32), chain_code(32), reserved(13)]`.
//!   These codes are 116 characters long and start with `PM8T`.
//! - **Compact legacy**: emitted by older wallets. Characters `4..68` form an
//!   alphanumeric segment; the chain code is `SHA-256(segment)` and the point is
//!   a domain-separated hash of the segment times the generator. Anyone can
//!   compute the discrete log of such a point, so these codes are watch-only
//!   identifiers and never payment recipients (see [`decode_recipient_code`]).
//!   [`DecodedPaymentCode::is_compatible_variant`] is false for them.
//!
//! Output is always canonical.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{bigint::ArrayEncoding, ops::Reduce};
use k256::{ProjectivePoint, PublicKey, Scalar, U256};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::SsoChallenge;
use crate::{PaycodeError, Result};

/// Text prefix shared by every payment code.
pub const PAYMENT_CODE_PREFIX: &str = "PM8T";

/// Shortest text accepted as a payment code.
pub const MIN_PAYMENT_CODE_LENGTH: usize = 50;

/// Base58Check version byte of canonical payment codes.
pub const PAYMENT_CODE_VERSION: u8 = 0x47;

/// Length of a canonical payment code in characters.
pub const CANONICAL_CODE_LENGTH: usize = 116;

/// Prefix of an authentication challenge payload.
pub const CHALLENGE_PREFIX: &str = "BIP47-SSO:";

const PAYLOAD_LEN: usize = 80;
const BIP47_V1: u8 = 0x01;
const LEGACY_SEGMENT_START: usize = 4;
const LEGACY_SEGMENT_END: usize = 68;
const LEGACY_POINT_DOMAIN: &[u8] = b"paycode/compact-legacy-point/v1";

/// Key material carried by a payment code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPaymentCode {
    pub version: u8,
    pub public_key: PublicKey,
    pub chain_code: [u8; 32],
    pub is_compatible_variant: bool,
}

impl DecodedPaymentCode {
    /// Compressed SEC1 encoding of the public key.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        compressed_bytes(&self.public_key)
    }

    /// Same public key and chain code.
    pub fn same_key_material(&self, other: &DecodedPaymentCode) -> bool {
        self.public_key == other.public_key && self.chain_code == other.chain_code
    }
}

/// Result of classifying one scanned QR payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScannedPayload {
    /// Text that looks like a payment code. Not yet validated.
    PaymentCode(String),
    /// A parsed authentication challenge.
    AuthChallenge(SsoChallenge),
}

pub(crate) fn compressed_bytes(key: &PublicKey) -> [u8; 33] {
    let point = key.to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(point.as_bytes());
    out
}

/// Decode payment code text into its key material.
///
/// # Errors
/// - `InvalidFormat` when the prefix is missing or the text is too short
/// - `InvalidEncoding` when the text is neither a valid canonical code nor a
///   compact legacy code, or a canonical payload carries no valid point
pub fn decode_payment_code(text: &str) -> Result<DecodedPaymentCode> {
    let text = text.trim();
    if !text.starts_with(PAYMENT_CODE_PREFIX) {
        return Err(PaycodeError::invalid_format(format!(
            "payment code must start with {}",
            PAYMENT_CODE_PREFIX
        )));
    }
    if text.len() < MIN_PAYMENT_CODE_LENGTH {
        return Err(PaycodeError::invalid_format(format!(
            "payment code is {} characters, at least {} required",
            text.len(),
            MIN_PAYMENT_CODE_LENGTH
        )));
    }

    match bs58::decode(text)
        .with_check(Some(PAYMENT_CODE_VERSION))
        .into_vec()
    {
        Ok(bytes) => decode_canonical(&bytes),
        // A canonical-length code with a bad checksum is a typo, not a legacy code.
        Err(e) if text.len() == CANONICAL_CODE_LENGTH => Err(PaycodeError::invalid_encoding(
            format!("canonical payment code failed Base58Check: {}", e),
        )),
        Err(_) => decode_compact_legacy(text),
    }
}

/// Decode a code that chains and notifications are derived towards.
///
/// # Errors
/// As [`decode_payment_code`], plus `InvalidFormat` for compact legacy codes:
/// their secret key follows from the code text.
pub fn decode_recipient_code(text: &str) -> Result<DecodedPaymentCode> {
    let decoded = decode_payment_code(text)?;
    ensure_recipient(&decoded)?;
    Ok(decoded)
}

pub(crate) fn ensure_recipient(decoded: &DecodedPaymentCode) -> Result<()> {
    if !decoded.is_compatible_variant {
        return Err(PaycodeError::invalid_format(
            "compact legacy codes cannot receive payments, use the canonical code",
        ));
    }
    Ok(())
}

fn decode_canonical(bytes: &[u8]) -> Result<DecodedPaymentCode> {
    let payload = match bytes.split_first() {
        Some((&PAYMENT_CODE_VERSION, rest)) if rest.len() == PAYLOAD_LEN => rest,
        _ => {
            return Err(PaycodeError::invalid_encoding(format!(
                "canonical payload must be {} bytes",
                PAYLOAD_LEN
            )))
        }
    };
    if payload[0] != BIP47_V1 {
        return Err(PaycodeError::invalid_encoding(format!(
            "unsupported payment code version {:#04x}",
            payload[0]
        )));
    }

    let public_key = PublicKey::from_sec1_bytes(&payload[2..35]).map_err(|_| {
        PaycodeError::invalid_encoding("payment code does not carry a valid secp256k1 point")
    })?;
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&payload[35..67]);

    Ok(DecodedPaymentCode {
        version: PAYMENT_CODE_VERSION,
        public_key,
        chain_code,
        is_compatible_variant: true,
    })
}

fn decode_compact_legacy(text: &str) -> Result<DecodedPaymentCode> {
    let end = text.len().min(LEGACY_SEGMENT_END);
    let segment = text
        .get(LEGACY_SEGMENT_START..end)
        .filter(|s| s.bytes().all(|b| b.is_ascii_alphanumeric()))
        .ok_or_else(|| {
            PaycodeError::invalid_encoding(
                "payment code is neither Base58Check nor an alphanumeric compact code",
            )
        })?;
    debug!(segment_len = segment.len(), "decoding compact legacy payment code");

    let chain_code: [u8; 32] = Sha256::digest(segment.as_bytes()).into();

    let digest = Sha256::new()
        .chain_update(LEGACY_POINT_DOMAIN)
        .chain_update(segment.as_bytes())
        .finalize();
    let scalar = <Scalar as Reduce<U256>>::reduce(U256::from_be_byte_array(digest));
    let point = (ProjectivePoint::GENERATOR * scalar).to_affine();
    let public_key = PublicKey::from_affine(point)
        .map_err(|_| PaycodeError::invalid_encoding("compact segment maps to the identity"))?;

    Ok(DecodedPaymentCode {
        version: PAYMENT_CODE_VERSION,
        public_key,
        chain_code,
        is_compatible_variant: false,
    })
}

/// Encode key material as a canonical payment code.
pub fn encode_payment_code(public_key: &PublicKey, chain_code: &[u8; 32]) -> String {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = BIP47_V1;
    payload[2..35].copy_from_slice(&compressed_bytes(public_key));
    payload[35..67].copy_from_slice(chain_code);

    bs58::encode(payload)
        .with_check_version(PAYMENT_CODE_VERSION)
        .into_string()
}

/// Classify a scanned QR payload.
///
/// Returns `None` for anything that is neither a payment code nor a
/// well-formed challenge. Never fails.
pub fn classify_scanned_payload(text: &str) -> Option<ScannedPayload> {
    let text = text.trim();
    if text.starts_with(PAYMENT_CODE_PREFIX) {
        return Some(ScannedPayload::PaymentCode(text.to_string()));
    }
    let json = text.strip_prefix(CHALLENGE_PREFIX)?;
    match serde_json::from_str::<SsoChallenge>(json.trim()) {
        Ok(challenge) => Some(ScannedPayload::AuthChallenge(challenge)),
        Err(e) => {
            debug!(error = %e, "ignoring malformed challenge payload");
            None
        }
    }
}

/// Render a challenge as a QR payload.
pub fn encode_challenge_payload(challenge: &SsoChallenge) -> Result<String> {
    Ok(format!(
        "{}{}",
        CHALLENGE_PREFIX,
        serde_json::to_string(challenge)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaycodeErrorCode;
    use k256::SecretKey;

    fn sample_key() -> PublicKey {
        SecretKey::from_slice(&[7u8; 32]).unwrap().public_key()
    }

    #[test]
    fn test_canonical_round_trip() {
        let key = sample_key();
        let chain_code = [9u8; 32];
        let code = encode_payment_code(&key, &chain_code);

        assert!(code.starts_with(PAYMENT_CODE_PREFIX));
        assert_eq!(code.len(), CANONICAL_CODE_LENGTH);

        let decoded = decode_payment_code(&code).unwrap();
        assert_eq!(decoded.public_key, key);
        assert_eq!(decoded.chain_code, chain_code);
        assert_eq!(decoded.version, PAYMENT_CODE_VERSION);
        assert!(decoded.is_compatible_variant);
    }

    #[test]
    fn test_compact_legacy_code() {
        let text = format!("PM8T{}", "A1b2C3d4E5".repeat(6));
        assert_eq!(text.len(), 64);

        let decoded = decode_payment_code(&text).unwrap();
        assert!(!decoded.is_compatible_variant);
        assert_eq!(hex::encode(decoded.chain_code).len(), 64);

        let again = decode_payment_code(&text).unwrap();
        assert!(decoded.same_key_material(&again));

        let exported = encode_payment_code(&decoded.public_key, &decoded.chain_code);
        let reimported = decode_payment_code(&exported).unwrap();
        assert!(decoded.same_key_material(&reimported));
    }

    #[test]
    fn test_format_errors() {
        let err = decode_payment_code(&"X".repeat(80)).unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidFormat);

        let err = decode_payment_code("PM8Tshort").unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidFormat);
    }

    #[test]
    fn test_encoding_errors() {
        let text = format!("PM8T{}", "ab-cd".repeat(12));
        let err = decode_payment_code(&text).unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidEncoding);

        // Flip one character of a canonical code.
        let code = encode_payment_code(&sample_key(), &[1u8; 32]);
        let mut chars: Vec<char> = code.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'z' { 'y' } else { 'z' };
        let corrupted: String = chars.into_iter().collect();
        let err = decode_payment_code(&corrupted).unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidEncoding);
    }

    #[test]
    fn test_classify_payloads() {
        let code = encode_payment_code(&sample_key(), &[2u8; 32]);
        assert_eq!(
            classify_scanned_payload(&format!("  {}\n", code)),
            Some(ScannedPayload::PaymentCode(code.clone()))
        );

        let challenge = SsoChallenge {
            challenge: "c-123".into(),
            service_name: "Example".into(),
            service_url: "https://example.com".into(),
            timestamp: 1_700_000_000_000,
            nonce: "n-1".into(),
        };
        let payload = encode_challenge_payload(&challenge).unwrap();
        assert!(payload.starts_with(CHALLENGE_PREFIX));
        assert_eq!(
            classify_scanned_payload(&payload),
            Some(ScannedPayload::AuthChallenge(challenge))
        );

        assert_eq!(classify_scanned_payload("BIP47-SSO:{not json"), None);
        assert_eq!(classify_scanned_payload("BIP47-SSO:{\"challenge\":\"x\"}"), None);
        assert_eq!(classify_scanned_payload("bitcoin:bc1qxyz"), None);
        assert_eq!(classify_scanned_payload(""), None);
    }
}
