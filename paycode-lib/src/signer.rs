//! # Hybrid challenge signatures
//!
//! ## Security Model
//!
//! A challenge is signed over its canonical hash:
//! - postcard serialization of the challenge fields in fixed order, prefixed
//!   with the domain separator `AUTH47_SSO_CHALLENGE_V1`
//! - SHA-512 of those bytes
//!
//! The hash is always signed with ECDSA/secp256k1 under the payment code's own
//! key. In hybrid mode it is also signed with SPHINCS+-SHA2-128f-simple under
//! an independent post-quantum key, and both signatures must verify.
//!
//! Verification never fails: it returns a [`Verification`] carrying an
//! outcome and the reason for it.
//!
//! The post-quantum key is declared in the bundle. Relying parties that know
//! the key out of band should use [`verify_pinned`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, VerifyingKey};
use pqcrypto_sphincsplus::sphincssha2128fsimple as sphincs;
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _};
use serde::Serialize;
use sha2::{Digest, Sha512};
use tracing::{debug, instrument, warn};

use crate::codec;
use crate::keys::PaymentCodeKeys;
use crate::models::{PaymentCode, SsoChallenge};
use crate::{PaycodeError, Result};

/// Domain separation constant for challenge signatures.
const CHALLENGE_DOMAIN: &[u8] = b"AUTH47_SSO_CHALLENGE_V1";

const HYBRID_BEGIN: &str = "-----BEGIN AUTH47 SSO SIGNATURE-----";
const HYBRID_END: &str = "-----END AUTH47 SSO SIGNATURE-----";
const PURE_BEGIN: &str = "-----BEGIN BIP47 SSO SIGNATURE-----";
const PURE_END: &str = "-----END BIP47 SSO SIGNATURE-----";
const PQ_SIGNATURE_FIELD: &str = "SPHINCS+ Signature:";
const WRAP_COLUMNS: usize = 64;

/// Signature scheme of a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// ECDSA/secp256k1 only.
    Ecdsa,
    /// ECDSA/secp256k1 and SPHINCS+-SHA2-128f-simple, verified conjunctively.
    Hybrid,
}

impl SignatureAlgorithm {
    pub const ECDSA_ID: &'static str = "ECDSA";
    pub const HYBRID_ID: &'static str = "ECDSA+SPHINCS+-SHA2-128f";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecdsa => Self::ECDSA_ID,
            Self::Hybrid => Self::HYBRID_ID,
        }
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self, Self::Hybrid)
    }

    fn markers(&self) -> (&'static str, &'static str) {
        match self {
            Self::Ecdsa => (PURE_BEGIN, PURE_END),
            Self::Hybrid => (HYBRID_BEGIN, HYBRID_END),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = PaycodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            Self::ECDSA_ID => Ok(Self::Ecdsa),
            Self::HYBRID_ID => Ok(Self::Hybrid),
            other => Err(PaycodeError::invalid_encoding(format!(
                "unknown signature algorithm: {}",
                other
            ))),
        }
    }
}

/// Signatures over one challenge, with the challenge fields they cover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureBundle {
    pub algorithm: SignatureAlgorithm,
    pub payment_code: String,
    pub challenge: SsoChallenge,
    /// SHA-512 of the canonical challenge bytes.
    pub hash: Vec<u8>,
    /// Compressed SEC1 public key.
    pub ecdsa_public_key: Vec<u8>,
    /// Fixed-size `r || s` encoding.
    pub ecdsa_signature: Vec<u8>,
    pub pq_public_key: Option<Vec<u8>>,
    pub pq_signature: Option<Vec<u8>>,
}

/// Outcome of a verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    Valid,
    Invalid,
}

/// Why a verification came out the way it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationReason {
    Ok,
    /// The bundle does not cover the expected challenge.
    HashMismatch,
    /// The bundle could not be parsed or is internally inconsistent.
    MalformedBundle,
    /// The classical key is not the payment code's key.
    KeyMismatch,
    ClassicalInvalid,
    PostQuantumInvalid,
    /// A hybrid check found no post-quantum component.
    PostQuantumMissing,
    /// The declared post-quantum key differs from the pinned one.
    PostQuantumKeyMismatch,
}

impl VerificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::HashMismatch => "hash mismatch",
            Self::MalformedBundle => "malformed bundle",
            Self::KeyMismatch => "public key does not match payment code",
            Self::ClassicalInvalid => "ECDSA signature invalid",
            Self::PostQuantumInvalid => "SPHINCS+ signature invalid",
            Self::PostQuantumMissing => "SPHINCS+ signature missing",
            Self::PostQuantumKeyMismatch => "SPHINCS+ key does not match pinned key",
        }
    }
}

impl fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definite result of checking a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verification {
    pub outcome: VerificationOutcome,
    pub reason: VerificationReason,
}

impl Verification {
    fn valid() -> Self {
        Self {
            outcome: VerificationOutcome::Valid,
            reason: VerificationReason::Ok,
        }
    }

    fn invalid(reason: VerificationReason) -> Self {
        Self {
            outcome: VerificationOutcome::Invalid,
            reason,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.outcome == VerificationOutcome::Valid
    }
}

#[derive(Serialize)]
struct CanonicalChallenge<'a> {
    domain: &'static [u8],
    challenge: &'a str,
    service_name: &'a str,
    service_url: &'a str,
    timestamp: i64,
    nonce: &'a str,
}

/// SHA-512 of the canonical challenge bytes.
pub fn challenge_hash(challenge: &SsoChallenge) -> Result<[u8; 64]> {
    let payload = CanonicalChallenge {
        domain: CHALLENGE_DOMAIN,
        challenge: &challenge.challenge,
        service_name: &challenge.service_name,
        service_url: &challenge.service_url,
        timestamp: challenge.timestamp,
        nonce: &challenge.nonce,
    };

    // postcard is deterministic (fixed field order, length-prefixed strings)
    let canonical_bytes = postcard::to_allocvec(&payload)
        .map_err(|e| PaycodeError::Serialization(format!("canonical challenge: {}", e)))?;

    let hash = Sha512::digest(&canonical_bytes);
    let mut result = [0u8; 64];
    result.copy_from_slice(&hash);
    Ok(result)
}

fn check_single_line(challenge: &SsoChallenge) -> Result<()> {
    let fields = [
        &challenge.challenge,
        &challenge.service_name,
        &challenge.service_url,
        &challenge.nonce,
    ];
    if fields.iter().any(|f| f.contains(['\n', '\r'])) {
        return Err(PaycodeError::invalid_format(
            "challenge fields must not contain line breaks",
        ));
    }
    Ok(())
}

/// Sign `challenge` with the keys of `code`.
///
/// # Errors
/// - `SigningUnavailable` when `keys` are not the keys of `code`, or `hybrid`
///   is requested and no SPHINCS+ keypair is held
/// - `InvalidFormat` when a challenge field spans several lines
#[instrument(skip(challenge, code, keys), fields(service = %challenge.service_url, code_id = %code.id))]
pub fn sign(
    challenge: &SsoChallenge,
    code: &PaymentCode,
    keys: &PaymentCodeKeys,
    hybrid: bool,
) -> Result<SignatureBundle> {
    check_single_line(challenge)?;
    if !keys.belongs_to(&code.key_material()?) {
        return Err(PaycodeError::signing_unavailable(format!(
            "keys do not belong to payment code {}",
            code.id
        )));
    }

    let hash = challenge_hash(challenge)?;
    let signature: Signature = keys.signing_key().sign(&hash);

    let (algorithm, pq_public_key, pq_signature) = if hybrid {
        let pq = keys.sphincs().ok_or_else(|| {
            PaycodeError::signing_unavailable(format!(
                "payment code {} has no SPHINCS+ keypair",
                code.id
            ))
        })?;
        (
            SignatureAlgorithm::Hybrid,
            Some(pq.public_key_bytes().to_vec()),
            Some(pq.sign(&hash)?),
        )
    } else {
        (SignatureAlgorithm::Ecdsa, None, None)
    };
    debug!(algorithm = %algorithm, "signed challenge");

    Ok(SignatureBundle {
        algorithm,
        payment_code: code.code.clone(),
        challenge: challenge.clone(),
        hash: hash.to_vec(),
        ecdsa_public_key: codec::compressed_bytes(&keys.public_key()).to_vec(),
        ecdsa_signature: signature.to_bytes().to_vec(),
        pq_public_key,
        pq_signature,
    })
}

/// Check the hash binding, key binding and ECDSA signature.
fn check_classical(bundle: &SignatureBundle, expected: &SsoChallenge) -> Verification {
    let expected_hash = match challenge_hash(expected) {
        Ok(hash) => hash,
        Err(_) => return Verification::invalid(VerificationReason::MalformedBundle),
    };
    if bundle.challenge != *expected || bundle.hash.as_slice() != expected_hash.as_slice() {
        return Verification::invalid(VerificationReason::HashMismatch);
    }

    let code_key = match codec::decode_payment_code(&bundle.payment_code) {
        Ok(decoded) => decoded.public_key_bytes(),
        Err(_) => return Verification::invalid(VerificationReason::MalformedBundle),
    };
    if bundle.ecdsa_public_key.as_slice() != code_key.as_slice() {
        return Verification::invalid(VerificationReason::KeyMismatch);
    }

    let verifying_key = match VerifyingKey::from_sec1_bytes(&bundle.ecdsa_public_key) {
        Ok(key) => key,
        Err(_) => return Verification::invalid(VerificationReason::MalformedBundle),
    };
    let valid = Signature::from_slice(&bundle.ecdsa_signature)
        .map(|sig| verifying_key.verify(&expected_hash, &sig).is_ok())
        .unwrap_or(false);
    if !valid {
        return Verification::invalid(VerificationReason::ClassicalInvalid);
    }
    Verification::valid()
}

fn check_post_quantum(bundle: &SignatureBundle) -> Verification {
    let (Some(pk_bytes), Some(sig_bytes)) = (&bundle.pq_public_key, &bundle.pq_signature) else {
        return Verification::invalid(VerificationReason::PostQuantumMissing);
    };
    let Ok(pk) = sphincs::PublicKey::from_bytes(pk_bytes) else {
        return Verification::invalid(VerificationReason::PostQuantumInvalid);
    };
    let Ok(sig) = sphincs::DetachedSignature::from_bytes(sig_bytes) else {
        return Verification::invalid(VerificationReason::PostQuantumInvalid);
    };
    match sphincs::verify_detached_signature(&sig, &bundle.hash, &pk) {
        Ok(()) => Verification::valid(),
        Err(_) => Verification::invalid(VerificationReason::PostQuantumInvalid),
    }
}

/// Verify `bundle` against the challenge the caller issued.
///
/// Hybrid bundles need both signatures to verify; ECDSA bundles only the
/// classical one.
pub fn verify(bundle: &SignatureBundle, expected: &SsoChallenge) -> Verification {
    if !bundle.algorithm.is_hybrid()
        && (bundle.pq_public_key.is_some() || bundle.pq_signature.is_some())
    {
        return Verification::invalid(VerificationReason::MalformedBundle);
    }

    let classical = check_classical(bundle, expected);
    if !classical.is_valid() || !bundle.algorithm.is_hybrid() {
        return classical;
    }
    let result = check_post_quantum(bundle);
    if !result.is_valid() {
        warn!(reason = %result.reason, "post-quantum component rejected");
    }
    result
}

/// Verify only the classical component, whatever the bundle's algorithm.
pub fn verify_classical(bundle: &SignatureBundle, expected: &SsoChallenge) -> Verification {
    check_classical(bundle, expected)
}

/// Parse an armored bundle and verify it.
pub fn verify_armored(text: &str, expected: &SsoChallenge) -> Verification {
    match parse_armored(text) {
        Ok(bundle) => verify(&bundle, expected),
        Err(e) => {
            debug!(error = %e, "unparseable signature bundle");
            Verification::invalid(VerificationReason::MalformedBundle)
        }
    }
}

/// Verify a hybrid bundle and require its post-quantum key to be `pinned_pq_key`.
pub fn verify_pinned(
    bundle: &SignatureBundle,
    expected: &SsoChallenge,
    pinned_pq_key: &[u8],
) -> Verification {
    if !bundle.algorithm.is_hybrid() {
        return Verification::invalid(VerificationReason::PostQuantumMissing);
    }
    let result = verify(bundle, expected);
    if !result.is_valid() {
        return result;
    }
    match &bundle.pq_public_key {
        Some(key) if key.as_slice() == pinned_pq_key => result,
        _ => Verification::invalid(VerificationReason::PostQuantumKeyMismatch),
    }
}

fn wrap(text: &str, columns: usize) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / columns + 1);
    for (i, c) in text.chars().enumerate() {
        if i > 0 && i % columns == 0 {
            out.push('\n');
        }
        out.push(c);
    }
    out
}

/// Why an armored bundle could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleParseError {
    #[error("missing BEGIN marker")]
    MissingBegin,
    #[error("missing END marker")]
    MissingEnd,
    #[error("unexpected line: {0}")]
    UnexpectedLine(String),
    #[error("duplicate field {0}")]
    DuplicateField(String),
    #[error("missing field {0}")]
    MissingField(String),
    #[error("field {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("algorithm does not match the armor markers")]
    AlgorithmMismatch,
    #[error("ECDSA bundle carries SPHINCS+ fields")]
    UnexpectedPostQuantum,
}

impl From<BundleParseError> for PaycodeError {
    fn from(err: BundleParseError) -> Self {
        PaycodeError::invalid_encoding(format!("signature bundle: {}", err))
    }
}

fn invalid_field(field: &str, reason: impl fmt::Display) -> BundleParseError {
    BundleParseError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn required<'a>(
    fields: &HashMap<&str, &'a str>,
    name: &str,
) -> std::result::Result<&'a str, BundleParseError> {
    fields
        .get(name)
        .copied()
        .ok_or_else(|| BundleParseError::MissingField(name.to_string()))
}

fn decode_hex_field(
    fields: &HashMap<&str, &str>,
    name: &str,
) -> std::result::Result<Vec<u8>, BundleParseError> {
    hex::decode(required(fields, name)?).map_err(|e| invalid_field(name, e))
}

fn parse_armored(text: &str) -> std::result::Result<SignatureBundle, BundleParseError> {
    let mut lines = text.trim().lines().map(|l| l.trim_end_matches('\r'));

    let algorithm_from_marker = match lines.next() {
        Some(HYBRID_BEGIN) => SignatureAlgorithm::Hybrid,
        Some(PURE_BEGIN) => SignatureAlgorithm::Ecdsa,
        _ => return Err(BundleParseError::MissingBegin),
    };
    let (_, end) = algorithm_from_marker.markers();

    let mut fields: HashMap<&str, &str> = HashMap::new();
    let mut pq_signature_b64: Option<String> = None;
    let mut closed = false;

    while let Some(line) = lines.next() {
        if line == end {
            closed = true;
            break;
        }
        if line.trim_end() == PQ_SIGNATURE_FIELD {
            let mut encoded = String::new();
            for continuation in lines.by_ref() {
                if continuation == end {
                    closed = true;
                    break;
                }
                encoded.push_str(continuation.trim());
            }
            pq_signature_b64 = Some(encoded);
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| BundleParseError::UnexpectedLine(line.to_string()))?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        if fields.insert(name, value).is_some() {
            return Err(BundleParseError::DuplicateField(name.to_string()));
        }
    }
    if !closed {
        return Err(BundleParseError::MissingEnd);
    }

    let algorithm: SignatureAlgorithm = required(&fields, "Algorithm")?
        .parse()
        .map_err(|e| invalid_field("Algorithm", e))?;
    if algorithm != algorithm_from_marker {
        return Err(BundleParseError::AlgorithmMismatch);
    }

    let timestamp = required(&fields, "Timestamp")?
        .parse::<i64>()
        .map_err(|e| invalid_field("Timestamp", e))?;
    let challenge = SsoChallenge {
        challenge: required(&fields, "Challenge")?.to_string(),
        service_name: required(&fields, "Service")?.to_string(),
        service_url: required(&fields, "Service Url")?.to_string(),
        timestamp,
        nonce: required(&fields, "Nonce")?.to_string(),
    };

    let pq_public_key = fields
        .get("SPHINCS+ Public Key")
        .map(|v| BASE64.decode(v))
        .transpose()
        .map_err(|e| invalid_field("SPHINCS+ Public Key", e))?;
    let pq_signature = pq_signature_b64
        .map(|v| BASE64.decode(v))
        .transpose()
        .map_err(|e| invalid_field("SPHINCS+ Signature", e))?;
    if !algorithm.is_hybrid() && (pq_public_key.is_some() || pq_signature.is_some()) {
        return Err(BundleParseError::UnexpectedPostQuantum);
    }

    Ok(SignatureBundle {
        algorithm,
        payment_code: required(&fields, "Payment Code")?.to_string(),
        challenge,
        hash: decode_hex_field(&fields, "Hash")?,
        ecdsa_public_key: decode_hex_field(&fields, "ECDSA Public Key")?,
        ecdsa_signature: decode_hex_field(&fields, "ECDSA Signature")?,
        pq_public_key,
        pq_signature,
    })
}

impl SignatureBundle {
    pub fn is_hybrid(&self) -> bool {
        self.algorithm.is_hybrid()
    }

    /// Render the armored wire format.
    pub fn to_armored(&self) -> String {
        let (begin, end) = self.algorithm.markers();
        let mut lines = vec![
            begin.to_string(),
            format!("Algorithm: {}", self.algorithm),
            format!("Payment Code: {}", self.payment_code),
            format!("Service: {}", self.challenge.service_name),
            format!("Service Url: {}", self.challenge.service_url),
            format!("Challenge: {}", self.challenge.challenge),
            format!("Timestamp: {}", self.challenge.timestamp),
            format!("Nonce: {}", self.challenge.nonce),
            format!("Hash: {}", hex::encode(&self.hash)),
            format!("ECDSA Public Key: {}", hex::encode(&self.ecdsa_public_key)),
            format!("ECDSA Signature: {}", hex::encode(&self.ecdsa_signature)),
        ];
        if let Some(pk) = &self.pq_public_key {
            lines.push(format!("SPHINCS+ Public Key: {}", BASE64.encode(pk)));
        }
        if let Some(sig) = &self.pq_signature {
            lines.push(PQ_SIGNATURE_FIELD.to_string());
            lines.push(wrap(&BASE64.encode(sig), WRAP_COLUMNS));
        }
        lines.push(end.to_string());
        lines.join("\n")
    }

    /// Parse the armored wire format.
    ///
    /// # Errors
    /// `InvalidEncoding` for anything that is not a complete, well-formed bundle.
    pub fn from_armored(text: &str) -> Result<Self> {
        Ok(parse_armored(text)?)
    }
}

impl fmt::Display for SignatureBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_armored())
    }
}

impl FromStr for SignatureBundle {
    type Err = PaycodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_armored(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PaycodeErrorCode;
    use crate::test_utils::{alice_keys, bob_keys, owned_code_record, sample_challenge};

    #[test]
    fn test_challenge_hash_is_deterministic() {
        let a = challenge_hash(&sample_challenge("n-1")).unwrap();
        let b = challenge_hash(&sample_challenge("n-1")).unwrap();
        let c = challenge_hash(&sample_challenge("n-2")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_pure_sign_and_verify() {
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");

        let bundle = sign(&challenge, &code, &keys, false).unwrap();
        assert_eq!(bundle.algorithm, SignatureAlgorithm::Ecdsa);
        assert!(bundle.pq_signature.is_none());
        assert_eq!(bundle.hash.len(), 64);

        let result = verify(&bundle, &challenge);
        assert!(result.is_valid());
        assert_eq!(result.reason, VerificationReason::Ok);
    }

    #[test]
    fn test_hybrid_requires_pq_keys() {
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let err = sign(&sample_challenge("n-1"), &code, &keys, true).unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::SigningUnavailable);
    }

    #[test]
    fn test_foreign_keys_cannot_sign() {
        let code = owned_code_record(&alice_keys(), "Alice");
        let err = sign(&sample_challenge("n-1"), &code, &bob_keys(), false).unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::SigningUnavailable);
    }

    #[test]
    fn test_hybrid_conjunction() {
        let keys = alice_keys().with_sphincs();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");

        let mut bundle = sign(&challenge, &code, &keys, true).unwrap();
        assert_eq!(bundle.algorithm.as_str(), "ECDSA+SPHINCS+-SHA2-128f");
        assert!(verify(&bundle, &challenge).is_valid());

        if let Some(sig) = bundle.pq_signature.as_mut() {
            sig[10] ^= 0x01;
        }
        let hybrid = verify(&bundle, &challenge);
        assert_eq!(hybrid.outcome, VerificationOutcome::Invalid);
        assert_eq!(hybrid.reason, VerificationReason::PostQuantumInvalid);
        assert!(verify_classical(&bundle, &challenge).is_valid());

        bundle.pq_signature = None;
        assert_eq!(
            verify(&bundle, &challenge).reason,
            VerificationReason::PostQuantumMissing
        );
    }

    #[test]
    fn test_hash_mismatch() {
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let bundle = sign(&sample_challenge("n-1"), &code, &keys, false).unwrap();

        let result = verify(&bundle, &sample_challenge("n-2"));
        assert_eq!(result.reason, VerificationReason::HashMismatch);
    }

    #[test]
    fn test_key_mismatch() {
        let alice = alice_keys();
        let bob = bob_keys();
        let alice_code = owned_code_record(&alice, "Alice");
        let bob_code = owned_code_record(&bob, "Bob");
        let challenge = sample_challenge("n-1");

        let mut bundle = sign(&challenge, &bob_code, &bob, false).unwrap();
        bundle.payment_code = alice_code.code;
        assert_eq!(
            verify(&bundle, &challenge).reason,
            VerificationReason::KeyMismatch
        );
    }

    #[test]
    fn test_classical_signature_tamper() {
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");

        let mut bundle = sign(&challenge, &code, &keys, false).unwrap();
        bundle.ecdsa_signature[5] ^= 0x80;
        assert_eq!(
            verify(&bundle, &challenge).reason,
            VerificationReason::ClassicalInvalid
        );
    }

    #[test]
    fn test_armored_round_trip() {
        let keys = alice_keys().with_sphincs();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");

        let bundle = sign(&challenge, &code, &keys, true).unwrap();
        let armored = bundle.to_armored();
        assert!(armored.starts_with("-----BEGIN AUTH47 SSO SIGNATURE-----"));
        assert!(armored.ends_with("-----END AUTH47 SSO SIGNATURE-----"));
        assert!(armored.lines().all(|l| l.len() <= 200));

        let parsed: SignatureBundle = armored.parse().unwrap();
        assert_eq!(parsed, bundle);
        assert!(verify_armored(&armored, &challenge).is_valid());

        let pure = sign(&challenge, &code, &keys, false).unwrap().to_armored();
        assert!(pure.starts_with("-----BEGIN BIP47 SSO SIGNATURE-----"));
        assert!(!pure.contains("SPHINCS+"));
        assert!(verify_armored(&pure, &challenge).is_valid());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_armored("nope"), Err(BundleParseError::MissingBegin));
        assert_eq!(
            parse_armored("-----BEGIN BIP47 SSO SIGNATURE-----\nAlgorithm: ECDSA"),
            Err(BundleParseError::MissingEnd)
        );
        let err = SignatureBundle::from_armored("nope").unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidEncoding);
    }

    #[test]
    fn test_malformed_armor() {
        let challenge = sample_challenge("n-1");
        for text in [
            "",
            "garbage",
            "-----BEGIN BIP47 SSO SIGNATURE-----\nAlgorithm: ECDSA\n",
            "-----BEGIN AUTH47 SSO SIGNATURE-----\nAlgorithm: ECDSA\n-----END AUTH47 SSO SIGNATURE-----",
        ] {
            let result = verify_armored(text, &challenge);
            assert_eq!(result.outcome, VerificationOutcome::Invalid);
            assert_eq!(result.reason, VerificationReason::MalformedBundle);
        }
    }

    #[test]
    fn test_pinned_key() {
        let keys = alice_keys().with_sphincs();
        let code = owned_code_record(&keys, "Alice");
        let challenge = sample_challenge("n-1");
        let bundle = sign(&challenge, &code, &keys, true).unwrap();

        let pinned = keys.sphincs().unwrap().public_key_bytes().to_vec();
        assert!(verify_pinned(&bundle, &challenge, &pinned).is_valid());

        let other = crate::keys::SphincsKeypair::generate();
        assert_eq!(
            verify_pinned(&bundle, &challenge, other.public_key_bytes()).reason,
            VerificationReason::PostQuantumKeyMismatch
        );

        let pure = sign(&challenge, &code, &keys, false).unwrap();
        assert_eq!(
            verify_pinned(&pure, &challenge, &pinned).reason,
            VerificationReason::PostQuantumMissing
        );
    }

    #[test]
    fn test_multiline_challenge_rejected() {
        let keys = alice_keys();
        let code = owned_code_record(&keys, "Alice");
        let mut challenge = sample_challenge("n-1");
        challenge.service_name = "Evil\nHash: 00".into();
        let err = sign(&challenge, &code, &keys, false).unwrap_err();
        assert_eq!(err.code(), PaycodeErrorCode::InvalidFormat);
    }
}
