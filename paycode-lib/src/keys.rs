//! Secret key material of locally owned payment codes.
//!
//! [`PaymentCodeKeys`] holds the secp256k1 secret, the chain code and an
//! optional SPHINCS+ keypair. [`KeyVault`] persists them in the secure store
//! under `paycode.keys.<code>`, one JSON entry per code.

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey;
use k256::{PublicKey, SecretKey};
use pqcrypto_sphincsplus::sphincssha2128fsimple as sphincs;
use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use tracing::{debug, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::codec::{self, DecodedPaymentCode};
use crate::secure_storage::{SecureKeyStorage, SecureKeyStorageExt};
use crate::{PaycodeError, Result};

/// Entry key prefix of vault entries.
pub const KEY_ENTRY_PREFIX: &str = "paycode.keys.";

const MASTER_KEY_DOMAIN: &[u8] = b"Bitcoin seed";

/// SPHINCS+-SHA2-128f-simple keypair bound to a payment code.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SphincsKeypair {
    public_key: Vec<u8>,
    secret_key: Vec<u8>,
}

impl SphincsKeypair {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let (pk, sk) = sphincs::keypair();
        Self {
            public_key: pk.as_bytes().to_vec(),
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    fn from_bytes(public_key: Vec<u8>, secret_key: Vec<u8>) -> Result<Self> {
        sphincs::PublicKey::from_bytes(&public_key)
            .map_err(|_| PaycodeError::invalid_encoding("malformed SPHINCS+ public key"))?;
        sphincs::SecretKey::from_bytes(&secret_key)
            .map_err(|_| PaycodeError::invalid_encoding("malformed SPHINCS+ secret key"))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key
    }

    /// Detached SPHINCS+ signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let sk = sphincs::SecretKey::from_bytes(&self.secret_key)
            .map_err(|_| PaycodeError::Internal("malformed SPHINCS+ secret key".into()))?;
        let sig = sphincs::detached_sign(message, &sk);
        Ok(pqcrypto_traits::sign::DetachedSignature::as_bytes(&sig).to_vec())
    }
}

impl fmt::Debug for SphincsKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SphincsKeypair")
            .field("public_key", &hex::encode(&self.public_key))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Secret half of a locally owned payment code.
#[derive(Clone)]
pub struct PaymentCodeKeys {
    secret_key: SecretKey,
    chain_code: [u8; 32],
    sphincs: Option<SphincsKeypair>,
}

impl PaymentCodeKeys {
    /// Derive the master key and chain code from a seed (`HMAC-SHA512("Bitcoin seed", seed)`).
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let mut mac = Hmac::<Sha512>::new_from_slice(MASTER_KEY_DOMAIN)
            .map_err(|e| PaycodeError::Internal(e.to_string()))?;
        mac.update(seed);
        let mut output = Zeroizing::new([0u8; 64]);
        output.copy_from_slice(&mac.finalize().into_bytes());

        let secret_key = SecretKey::from_slice(&output[..32])
            .map_err(|_| PaycodeError::Internal("seed yields an invalid secret key".into()))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&output[32..]);
        Ok(Self {
            secret_key,
            chain_code,
            sphincs: None,
        })
    }

    /// Build keys from a raw secret scalar and chain code.
    pub fn from_parts(secret_key: &[u8; 32], chain_code: [u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(secret_key)
            .map_err(|_| PaycodeError::invalid_encoding("secret key is not a valid scalar"))?;
        Ok(Self {
            secret_key,
            chain_code,
            sphincs: None,
        })
    }

    /// Generate keys from a fresh random seed, with a SPHINCS+ keypair when `with_pq` is set.
    pub fn generate(with_pq: bool) -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *seed);
        let keys = Self::from_seed(&*seed)?;
        Ok(if with_pq { keys.with_sphincs() } else { keys })
    }

    /// Attach a freshly generated SPHINCS+ keypair.
    pub fn with_sphincs(mut self) -> Self {
        self.sphincs = Some(SphincsKeypair::generate());
        self
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret_key.public_key()
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from(&self.secret_key)
    }

    pub fn sphincs(&self) -> Option<&SphincsKeypair> {
        self.sphincs.as_ref()
    }

    /// Canonical payment code of these keys.
    pub fn payment_code(&self) -> String {
        codec::encode_payment_code(&self.public_key(), &self.chain_code)
    }

    /// Whether these keys are the secret half of `decoded`.
    pub fn belongs_to(&self, decoded: &DecodedPaymentCode) -> bool {
        decoded.public_key == self.public_key() && decoded.chain_code == self.chain_code
    }

    fn to_stored(&self) -> StoredKeys {
        StoredKeys {
            secret_key: hex::encode(self.secret_key.to_bytes()),
            chain_code: hex::encode(self.chain_code),
            sphincs_public_key: self.sphincs.as_ref().map(|k| hex::encode(&k.public_key)),
            sphincs_secret_key: self.sphincs.as_ref().map(|k| hex::encode(&k.secret_key)),
        }
    }

    fn from_stored(stored: &StoredKeys) -> Result<Self> {
        let secret = Zeroizing::new(decode_hex32(&stored.secret_key, "secret key")?);
        let chain_code = decode_hex32(&stored.chain_code, "chain code")?;
        let mut keys = Self::from_parts(&secret, chain_code)?;

        keys.sphincs = match (&stored.sphincs_public_key, &stored.sphincs_secret_key) {
            (Some(pk), Some(sk)) => Some(SphincsKeypair::from_bytes(
                decode_hex(pk, "SPHINCS+ public key")?,
                decode_hex(sk, "SPHINCS+ secret key")?,
            )?),
            (None, None) => None,
            _ => {
                return Err(PaycodeError::invalid_encoding(
                    "stored SPHINCS+ keypair is incomplete",
                ))
            }
        };
        Ok(keys)
    }
}

impl Drop for PaymentCodeKeys {
    fn drop(&mut self) {
        self.chain_code.zeroize();
    }
}

impl fmt::Debug for PaymentCodeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentCodeKeys")
            .field("public_key", &hex::encode(codec::compressed_bytes(&self.public_key())))
            .field("secret_key", &"<redacted>")
            .field("has_sphincs", &self.sphincs.is_some())
            .finish()
    }
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct StoredKeys {
    secret_key: String,
    chain_code: String,
    #[serde(default)]
    sphincs_public_key: Option<String>,
    #[serde(default)]
    sphincs_secret_key: Option<String>,
}

fn decode_hex(value: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| PaycodeError::invalid_encoding(format!("{}: {}", what, e)))
}

fn decode_hex32(value: &str, what: &str) -> Result<[u8; 32]> {
    let bytes = Zeroizing::new(decode_hex(value, what)?);
    let mut out = [0u8; 32];
    if bytes.len() != out.len() {
        return Err(PaycodeError::invalid_encoding(format!(
            "{} must be 32 bytes, got {}",
            what,
            bytes.len()
        )));
    }
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Secret key entries in the secure store, one per owned payment code.
pub struct KeyVault<S: SecureKeyStorage> {
    storage: Arc<S>,
}

impl<S: SecureKeyStorage> KeyVault<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Secure store entry key for `code`.
    pub fn entry_key(code: &str) -> String {
        format!("{}{}", KEY_ENTRY_PREFIX, code)
    }

    /// Store or replace the keys of `code`.
    #[instrument(skip(self, keys), fields(code = %code))]
    pub async fn store(&self, code: &str, keys: &PaymentCodeKeys) -> Result<()> {
        let stored = keys.to_stored();
        let bytes = Zeroizing::new(serde_json::to_vec(&stored)?);
        self.storage.upsert(&Self::entry_key(code), &bytes).await?;
        debug!("stored payment code keys");
        Ok(())
    }

    /// Load the keys of `code`.
    ///
    /// # Errors
    /// `SigningUnavailable` when the vault holds no keys for `code`.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn load(&self, code: &str) -> Result<PaymentCodeKeys> {
        let bytes = self
            .storage
            .retrieve(&Self::entry_key(code))
            .await?
            .map(Zeroizing::new)
            .ok_or_else(|| {
                PaycodeError::signing_unavailable(format!("no keys held for {}", code))
            })?;
        let stored: StoredKeys = serde_json::from_slice(&bytes)?;
        PaymentCodeKeys::from_stored(&stored)
    }

    /// Remove the keys of `code`. Missing entries are not an error.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn delete(&self, code: &str) -> Result<()> {
        self.storage.delete_if_exists(&Self::entry_key(code)).await?;
        Ok(())
    }

    pub async fn contains(&self, code: &str) -> Result<bool> {
        Ok(self.storage.exists(&Self::entry_key(code)).await?)
    }
}
