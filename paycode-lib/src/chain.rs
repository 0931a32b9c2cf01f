//! Deterministic address chains between two payment codes.
//!
//! For sender secret `a`, recipient point `B` and recipient chain code `c`:
//!
//! ```text
//! S   = a·B
//! t_i = HMAC-SHA256(c, S.x || be32(i)) mod n
//! P_i = B + t_i·G
//! address_i = bech32 P2WPKH(HASH160(compressed(P_i)))
//! ```
//!
//! The recipient holds `b` with `b·A = a·B`, so it can compute the secret
//! `b + t_i` behind every `P_i` (see [`ChainDeriver::derive_receive_key`]).

use chrono::Utc;
use hmac::{Hmac, Mac};
use k256::elliptic_curve::{bigint::ArrayEncoding, ops::Reduce};
use k256::{NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey, U256};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::codec::{self, DecodedPaymentCode};
use crate::config::BitcoinNetwork;
use crate::keys::PaymentCodeKeys;
use crate::models::{DerivedAddress, PaymentChain, PaymentCode};
use crate::{PaycodeError, Result};

/// Largest number of addresses derived in one call.
pub const MAX_CHAIN_LENGTH: u32 = 1000;

/// Reserved for the notification channel; never issued as a chain index.
pub const NOTIFICATION_INDEX: u32 = 0xFFFF_FFFF;

/// x-coordinate of the ECDH shared point.
pub(crate) fn shared_secret(secret: &SecretKey, point: &PublicKey) -> Zeroizing<[u8; 32]> {
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), point.as_affine());
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(shared.raw_secret_bytes());
    out
}

/// `HMAC-SHA256(chain_code, shared_x || be32(index))` as raw bytes.
pub(crate) fn blinding_bytes(
    shared_x: &[u8; 32],
    chain_code: &[u8; 32],
    index: u32,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(chain_code)
        .map_err(|e| PaycodeError::Internal(e.to_string()))?;
    mac.update(shared_x);
    mac.update(&index.to_be_bytes());
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn tweak(shared_x: &[u8; 32], chain_code: &[u8; 32], index: u32) -> Result<Scalar> {
    let bytes = blinding_bytes(shared_x, chain_code, index)?;
    let mut wide = k256::FieldBytes::default();
    wide.copy_from_slice(&bytes[..]);
    Ok(<Scalar as Reduce<U256>>::reduce(U256::from_be_byte_array(wide)))
}

fn tweaked_point(base: &PublicKey, tweak: &Scalar) -> Result<PublicKey> {
    let point = ProjectivePoint::from(*base.as_affine()) + ProjectivePoint::GENERATOR * tweak;
    PublicKey::from_affine(point.to_affine())
        .map_err(|_| PaycodeError::Internal("tweaked point is the identity".into()))
}

/// Native segwit v0 address of a compressed public key.
pub fn p2wpkh_address(key: &PublicKey, network: BitcoinNetwork) -> Result<String> {
    let hash160 = Ripemd160::digest(Sha256::digest(codec::compressed_bytes(key)));
    let hrp = bech32::Hrp::parse(network.address_prefix())
        .map_err(|e| PaycodeError::Internal(format!("address prefix: {}", e)))?;
    bech32::segwit::encode_v0(hrp, &hash160)
        .map_err(|e| PaycodeError::Internal(format!("address encoding: {}", e)))
}

fn check_count(count: u32) -> Result<()> {
    if count == 0 || count > MAX_CHAIN_LENGTH {
        return Err(PaycodeError::invalid_format(format!(
            "address count must be between 1 and {}, got {}",
            MAX_CHAIN_LENGTH, count
        )));
    }
    Ok(())
}

/// Derives payment chains. Holds no state beyond the address network.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainDeriver {
    network: BitcoinNetwork,
}

impl ChainDeriver {
    pub fn new(network: BitcoinNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> BitcoinNetwork {
        self.network
    }

    /// Derive the first `count` addresses from `sender` to `recipient_code`.
    ///
    /// # Errors
    /// - `InvalidFormat` / `InvalidEncoding` for a bad recipient code or count,
    ///   or a compact legacy recipient
    /// - `SigningUnavailable` when `sender_keys` are not the keys of `sender`
    #[instrument(skip(self, sender, sender_keys, recipient_code), fields(sender_id = %sender.id))]
    pub fn derive_chain(
        &self,
        sender: &PaymentCode,
        sender_keys: &PaymentCodeKeys,
        recipient_code: &str,
        recipient_label: &str,
        count: u32,
    ) -> Result<PaymentChain> {
        check_count(count)?;
        let recipient = codec::decode_recipient_code(recipient_code)?;
        if !sender_keys.belongs_to(&sender.key_material()?) {
            return Err(PaycodeError::signing_unavailable(format!(
                "keys do not belong to payment code {}",
                sender.id
            )));
        }

        let shared = shared_secret(sender_keys.secret_key(), &recipient.public_key);
        let addresses = (0..count)
            .map(|index| self.address_at(&shared, &recipient, index))
            .collect::<Result<Vec<_>>>()?;
        debug!(count, "derived payment chain");

        Ok(PaymentChain {
            id: uuid::Uuid::new_v4().to_string(),
            payment_code_id: sender.id.clone(),
            recipient_code: recipient_code.trim().to_string(),
            recipient_label: recipient_label.to_string(),
            addresses,
            notification_reference: None,
            notification_sent: false,
            created_at: Utc::now(),
        })
    }

    /// Derive a single sender-side address.
    pub fn derive_address(
        &self,
        sender_keys: &PaymentCodeKeys,
        recipient: &DecodedPaymentCode,
        index: u32,
    ) -> Result<DerivedAddress> {
        codec::ensure_recipient(recipient)?;
        let shared = shared_secret(sender_keys.secret_key(), &recipient.public_key);
        self.address_at(&shared, recipient, index)
    }

    /// Append `additional` addresses to `chain`, continuing at its next index.
    ///
    /// Issued addresses are left untouched.
    #[instrument(skip(self, chain, sender_keys), fields(chain_id = %chain.id))]
    pub fn extend_chain(
        &self,
        chain: &mut PaymentChain,
        sender_keys: &PaymentCodeKeys,
        additional: u32,
    ) -> Result<()> {
        check_count(additional)?;
        let start = chain.next_index();
        let end = start
            .checked_add(additional)
            .filter(|end| *end < NOTIFICATION_INDEX)
            .ok_or_else(|| PaycodeError::invalid_format("chain index space exhausted"))?;

        let recipient = codec::decode_recipient_code(&chain.recipient_code)?;
        let shared = shared_secret(sender_keys.secret_key(), &recipient.public_key);

        if let Some(first) = chain.first_address() {
            let expected = self.address_at(&shared, &recipient, first.index)?;
            if expected.public_key != first.public_key {
                return Err(PaycodeError::signing_unavailable(format!(
                    "keys do not belong to the sender of chain {}",
                    chain.id
                )));
            }
        }

        let mut fresh = (start..end)
            .map(|index| self.address_at(&shared, &recipient, index))
            .collect::<Result<Vec<_>>>()?;
        chain.addresses.append(&mut fresh);
        debug!(start, end, "extended payment chain");
        Ok(())
    }

    /// Recipient side: the secret key and address for `index` of the chain
    /// `sender_code` derives towards `recipient_keys`.
    ///
    /// The returned public key equals the sender's `P_i`.
    pub fn derive_receive_key(
        &self,
        recipient_keys: &PaymentCodeKeys,
        sender_code: &str,
        index: u32,
    ) -> Result<(SecretKey, DerivedAddress)> {
        if index == NOTIFICATION_INDEX {
            return Err(PaycodeError::invalid_format(
                "notification index is not a chain index",
            ));
        }
        let sender = codec::decode_payment_code(sender_code)?;
        let shared = shared_secret(recipient_keys.secret_key(), &sender.public_key);
        let t = tweak(&shared, recipient_keys.chain_code(), index)?;

        let sum = *recipient_keys.secret_key().to_nonzero_scalar() + t;
        let scalar = Option::<NonZeroScalar>::from(NonZeroScalar::new(sum))
            .ok_or_else(|| PaycodeError::Internal("receive key is zero".into()))?;
        let secret = SecretKey::from(scalar);
        let public = secret.public_key();

        let address = DerivedAddress {
            index,
            address: p2wpkh_address(&public, self.network)?,
            public_key: hex::encode(codec::compressed_bytes(&public)),
            used: false,
            balance: 0,
            transactions: 0,
        };
        Ok((secret, address))
    }

    fn address_at(
        &self,
        shared_x: &[u8; 32],
        recipient: &DecodedPaymentCode,
        index: u32,
    ) -> Result<DerivedAddress> {
        let t = tweak(shared_x, &recipient.chain_code, index)?;
        let point = tweaked_point(&recipient.public_key, &t)?;
        Ok(DerivedAddress {
            index,
            address: p2wpkh_address(&point, self.network)?,
            public_key: hex::encode(codec::compressed_bytes(&point)),
            used: false,
            balance: 0,
            transactions: 0,
        })
    }
}
