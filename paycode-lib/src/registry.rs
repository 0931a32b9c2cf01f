//! Registry of imported and locally created payment codes.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::chain_store::ChainStore;
use crate::codec::{self, DecodedPaymentCode};
use crate::collection::{Collection, PAYMENT_CODES};
use crate::keys::{KeyVault, PaymentCodeKeys};
use crate::models::PaymentCode;
use crate::secure_storage::SecureKeyStorage;
use crate::sessions::SessionStore;
use crate::{PaycodeError, Result};

/// Owner of the `payment_codes` collection and of the key vault.
///
/// Holds the chain and session stores to refuse deleting a code that is
/// still referenced.
pub struct Registry<S: SecureKeyStorage> {
    codes: Collection<PaymentCode, S>,
    vault: KeyVault<S>,
    chains: Arc<ChainStore<S>>,
    sessions: Arc<SessionStore<S>>,
}

impl<S: SecureKeyStorage> Registry<S> {
    pub fn new(
        storage: Arc<S>,
        chains: Arc<ChainStore<S>>,
        sessions: Arc<SessionStore<S>>,
    ) -> Self {
        Self {
            codes: Collection::new(storage.clone(), PAYMENT_CODES),
            vault: KeyVault::new(storage),
            chains,
            sessions,
        }
    }

    pub fn vault(&self) -> &KeyVault<S> {
        &self.vault
    }

    /// Validate and store a payment code received from someone else.
    ///
    /// # Errors
    /// - `InvalidFormat` / `InvalidEncoding` if the text is not a payment code
    /// - `AlreadyExists` if the same code text is already registered
    #[instrument(skip(self, text))]
    pub async fn import_code(&self, text: &str, label: &str) -> Result<PaymentCode> {
        let text = text.trim();
        let decoded = codec::decode_payment_code(text)?;
        let record =
            PaymentCode::from_decoded(uuid::Uuid::new_v4().to_string(), text, label, &decoded);
        let imported = self.insert(record).await?;
        info!(
            code_id = %imported.id,
            compatible = imported.is_compatible_variant,
            "payment code imported"
        );
        Ok(imported)
    }

    /// Generate a new owned payment code with ECDSA and SPHINCS+ keys.
    #[instrument(skip(self))]
    pub async fn create_code(&self, label: &str) -> Result<PaymentCode> {
        let keys = PaymentCodeKeys::generate(true)?;
        let code = keys.payment_code();
        let decoded = codec::decode_payment_code(&code)?;

        self.vault.store(&code, &keys).await?;
        let record =
            PaymentCode::from_decoded(uuid::Uuid::new_v4().to_string(), code.clone(), label, &decoded);
        match self.insert(record).await {
            Ok(created) => {
                info!(code_id = %created.id, "payment code created");
                Ok(created)
            }
            Err(e) => {
                self.vault.delete(&code).await?;
                Err(e)
            }
        }
    }

    async fn insert(&self, record: PaymentCode) -> Result<PaymentCode> {
        self.codes
            .update(|codes| {
                if codes.iter().any(|c| c.code == record.code) {
                    return Err(PaycodeError::already_exists("payment code", &record.code));
                }
                codes.push(record.clone());
                Ok(record)
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<PaymentCode>> {
        self.codes.load().await
    }

    pub async fn get(&self, id: &str) -> Result<PaymentCode> {
        self.codes
            .load()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| PaycodeError::not_found("payment code", id))
    }

    /// Look up a registered code by its text.
    pub async fn find_by_code(&self, text: &str) -> Result<Option<PaymentCode>> {
        let text = text.trim();
        Ok(self.codes.load().await?.into_iter().find(|c| c.code == text))
    }

    /// Whether `decoded` carries the key material of a registered compact
    /// legacy code, for instance through its canonical export.
    pub async fn shares_legacy_key_material(&self, decoded: &DecodedPaymentCode) -> Result<bool> {
        for code in self.codes.load().await? {
            if !code.is_compatible_variant && code.key_material()?.same_key_material(decoded) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Canonical export form of a registered code.
    pub async fn export_format(&self, id: &str) -> Result<String> {
        self.get(id).await?.export_format()
    }

    /// Secret keys of an owned code.
    ///
    /// # Errors
    /// `SigningUnavailable` for codes imported from others.
    pub async fn keys_for(&self, code: &PaymentCode) -> Result<PaymentCodeKeys> {
        self.vault.load(&code.code).await
    }

    /// Whether the vault holds secret keys for `code`.
    pub async fn is_owned(&self, code: &PaymentCode) -> Result<bool> {
        self.vault.contains(&code.code).await
    }

    /// Delete a code that no chain or session references, together with its keys.
    ///
    /// # Errors
    /// - `NotFound` if no code has this id
    /// - `InUse` if a payment chain or SSO session references it
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let record = self.get(id).await?;

        let chains = self
            .chains
            .list()
            .await?
            .into_iter()
            .filter(|c| c.payment_code_id == record.id || c.recipient_code == record.code)
            .count();
        let sessions = self.sessions.list_for_code(&record.id).await?.len();
        if chains > 0 || sessions > 0 {
            warn!(chains, sessions, "refusing to delete referenced payment code");
            return Err(PaycodeError::in_use(
                id,
                format!(
                    "referenced by {} payment chain(s) and {} session(s)",
                    chains, sessions
                ),
            ));
        }

        // Keys go first so a failure never leaves a secret without its record.
        let held = if self.vault.contains(&record.code).await? {
            Some(self.vault.load(&record.code).await?)
        } else {
            None
        };
        self.vault.delete(&record.code).await?;

        let removed = self
            .codes
            .update(|codes| {
                let before = codes.len();
                codes.retain(|c| c.id != id);
                if codes.len() == before {
                    return Err(PaycodeError::not_found("payment code", id));
                }
                Ok(())
            })
            .await;
        if let Err(e) = removed {
            if let Some(keys) = &held {
                if let Err(restore) = self.vault.store(&record.code, keys).await {
                    error!(error = %restore, "could not restore keys after failed delete");
                }
            }
            return Err(e);
        }
        info!("payment code deleted");
        Ok(())
    }
}
