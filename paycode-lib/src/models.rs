//! Records persisted or exchanged by the payment code core.
//!
//! Field names serialize in camelCase so collections written by earlier
//! wallet builds load unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::{self, DecodedPaymentCode};
use crate::Result;

/// An imported or locally created payment code.
///
/// Immutable once created; removed only through [`crate::Registry::delete`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCode {
    pub id: String,
    /// Encoded payment code text as imported.
    pub code: String,
    pub label: String,
    /// Protocol version byte.
    pub version: u8,
    /// Compressed secp256k1 point, hex (33 bytes).
    pub public_key: String,
    /// Chain code, hex (32 bytes).
    pub chain_code: String,
    pub created_at: DateTime<Utc>,
    /// True for canonical (PayNym-compatible) BIP47 codes, false for the compact legacy form.
    pub is_compatible_variant: bool,
}

impl PaymentCode {
    /// Build a record from decoded key material.
    pub fn from_decoded(
        id: impl Into<String>,
        code: impl Into<String>,
        label: impl Into<String>,
        decoded: &DecodedPaymentCode,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            label: label.into(),
            version: decoded.version,
            public_key: hex::encode(decoded.public_key_bytes()),
            chain_code: hex::encode(decoded.chain_code),
            created_at: Utc::now(),
            is_compatible_variant: decoded.is_compatible_variant,
        }
    }

    /// Decode the key material behind this record.
    pub fn key_material(&self) -> Result<DecodedPaymentCode> {
        codec::decode_payment_code(&self.code)
    }

    /// The canonical export form of this code.
    ///
    /// Importing the exported text yields the same key material.
    pub fn export_format(&self) -> Result<String> {
        let decoded = self.key_material()?;
        Ok(codec::encode_payment_code(
            &decoded.public_key,
            &decoded.chain_code,
        ))
    }
}

/// One address of a payment chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedAddress {
    pub index: u32,
    pub address: String,
    /// Per-index tweaked public key, compressed hex.
    pub public_key: String,
    /// Set by the external chain indexer.
    pub used: bool,
    /// Advisory, supplied by the external chain indexer.
    pub balance: u64,
    /// Advisory, supplied by the external chain indexer.
    pub transactions: u64,
}

/// Ordered, append-only sequence of addresses between a sender code and a recipient code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChain {
    pub id: String,
    /// Identity of the sender's [`PaymentCode`].
    pub payment_code_id: String,
    pub recipient_code: String,
    pub recipient_label: String,
    pub addresses: Vec<DerivedAddress>,
    /// Reference and nonce of the sent notification. The nonce is needed
    /// to verify the reference on the recipient side.
    #[serde(
        default,
        alias = "notificationTxId",
        deserialize_with = "deserialize_stored_reference"
    )]
    pub notification_reference: Option<NotificationReference>,
    #[serde(default)]
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl PaymentChain {
    /// Index the next derived address will get.
    pub fn next_index(&self) -> u32 {
        self.addresses.len() as u32
    }

    /// Whether the indexer has seen any address of this chain in use.
    pub fn has_used_addresses(&self) -> bool {
        self.addresses.iter().any(|a| a.used)
    }

    /// Look up an address by index.
    pub fn address(&self, index: u32) -> Option<&DerivedAddress> {
        self.addresses.get(index as usize)
    }

    /// First address of the chain, handed to the notification step.
    pub fn first_address(&self) -> Option<&DerivedAddress> {
        self.addresses.first()
    }
}

/// Authentication challenge as carried in a scanned payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoChallenge {
    /// Opaque server nonce.
    pub challenge: String,
    pub service_name: String,
    pub service_url: String,
    /// Issuance time from the challenger, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Anti-replay token.
    pub nonce: String,
}

/// Lifecycle state of an SSO session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    /// Expired and revoked sessions never change state again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a successful challenge-response authentication.
///
/// The stored `status` only ever moves from `active` to `revoked`. Expiry is
/// computed on read; use [`SsoSession::effective_status`] rather than reading
/// `status` directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoSession {
    pub id: String,
    pub service_name: String,
    pub service_url: String,
    pub challenge: String,
    /// Anti-replay token of the signed challenge.
    #[serde(default)]
    pub nonce: String,
    /// Armored signature bundle.
    pub signature: String,
    pub payment_code_id: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub auth47_enabled: bool,
}

impl SsoSession {
    /// Status after applying the lazy expiry rule at `now`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        crate::sessions::effective_status(self, now)
    }
}

/// Blinded one-time reference for the notification channel between two codes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReference {
    /// HMAC-SHA256 reference, hex.
    pub reference: String,
    /// Freshness value mixed into the reference (milliseconds since the Unix epoch).
    pub nonce: i64,
    pub created_at: DateTime<Utc>,
}

/// Stored form of a chain's notification: the full record, or the bare
/// identifier written by older wallet builds.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredReference {
    Full(NotificationReference),
    Bare(String),
}

impl From<StoredReference> for NotificationReference {
    fn from(stored: StoredReference) -> Self {
        match stored {
            StoredReference::Full(reference) => reference,
            // No nonce was kept, so a bare identifier never verifies.
            StoredReference::Bare(reference) => NotificationReference {
                reference,
                nonce: 0,
                created_at: DateTime::<Utc>::default(),
            },
        }
    }
}

fn deserialize_stored_reference<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<NotificationReference>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StoredReference>::deserialize(deserializer)?.map(Into::into))
}
