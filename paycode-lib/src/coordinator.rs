//! Wiring of the registry, chain and session stores over one secure store.

use std::sync::Arc;

use k256::SecretKey;
use tracing::{instrument, warn};

use crate::chain_store::ChainStore;
use crate::codec;
use crate::config::PaycodeConfig;
use crate::models::{DerivedAddress, NotificationReference, PaymentChain, SsoChallenge, SsoSession};
use crate::notification;
use crate::registry::Registry;
use crate::secure_storage::SecureKeyStorage;
use crate::sessions::SessionStore;
use crate::signer;
use crate::{PaycodeError, Result};

/// Coordinates the flows that span several components.
pub struct PaycodeCoordinator<S: SecureKeyStorage> {
    config: PaycodeConfig,
    registry: Registry<S>,
    chains: Arc<ChainStore<S>>,
    sessions: Arc<SessionStore<S>>,
}

impl<S: SecureKeyStorage> PaycodeCoordinator<S> {
    pub fn new(storage: Arc<S>, config: PaycodeConfig) -> Self {
        let chains = Arc::new(ChainStore::new(storage.clone(), &config));
        let sessions = Arc::new(SessionStore::new(storage.clone(), &config));
        let registry = Registry::new(storage, chains.clone(), sessions.clone());
        Self {
            config,
            registry,
            chains,
            sessions,
        }
    }

    pub fn config(&self) -> &PaycodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn chains(&self) -> &ChainStore<S> {
        &self.chains
    }

    pub fn sessions(&self) -> &SessionStore<S> {
        &self.sessions
    }

    /// Refuse recipients whose secret key is public: compact legacy codes and
    /// canonical codes carrying the key material of a registered legacy code.
    async fn check_recipient(&self, recipient_code: &str) -> Result<()> {
        let decoded = codec::decode_recipient_code(recipient_code)?;
        if self.registry.shares_legacy_key_material(&decoded).await? {
            warn!("refusing recipient with compact legacy key material");
            return Err(PaycodeError::invalid_format(
                "recipient carries the key material of a compact legacy code",
            ));
        }
        Ok(())
    }

    /// Derive and store a chain from the owned code `sender_id` to `recipient_code`.
    ///
    /// `count` defaults to the configured chain length.
    #[instrument(skip(self, recipient_code))]
    pub async fn derive_chain(
        &self,
        sender_id: &str,
        recipient_code: &str,
        recipient_label: &str,
        count: Option<u32>,
    ) -> Result<PaymentChain> {
        self.check_recipient(recipient_code).await?;
        let sender = self.registry.get(sender_id).await?;
        let keys = self.registry.keys_for(&sender).await?;
        let chain = self.chains.deriver().derive_chain(
            &sender,
            &keys,
            recipient_code,
            recipient_label,
            count.unwrap_or(self.config.default_chain_length),
        )?;
        self.chains.save(chain).await
    }

    /// Append addresses to a stored chain.
    pub async fn extend_chain(&self, chain_id: &str, additional: u32) -> Result<PaymentChain> {
        let chain = self.chains.get(chain_id).await?;
        self.check_recipient(&chain.recipient_code).await?;
        let sender = self.registry.get(&chain.payment_code_id).await?;
        let keys = self.registry.keys_for(&sender).await?;
        self.chains.extend(chain_id, &keys, additional).await
    }

    /// Build the notification reference of a chain and record it.
    #[instrument(skip(self))]
    pub async fn send_notification(
        &self,
        chain_id: &str,
    ) -> Result<(PaymentChain, NotificationReference)> {
        let chain = self.chains.get(chain_id).await?;
        self.check_recipient(&chain.recipient_code).await?;
        let sender = self.registry.get(&chain.payment_code_id).await?;
        let keys = self.registry.keys_for(&sender).await?;
        let reference =
            notification::build_notification_reference(&sender, &keys, &chain.recipient_code)?;
        let chain = self
            .chains
            .mark_notification_sent(chain_id, &reference)
            .await?;
        Ok((chain, reference))
    }

    /// Sign `challenge` with the owned code `code_id` and issue a session.
    ///
    /// `hybrid` defaults to the configured signature mode.
    #[instrument(skip(self, challenge), fields(service = %challenge.service_url))]
    pub async fn authenticate(
        &self,
        challenge: &SsoChallenge,
        code_id: &str,
        hybrid: Option<bool>,
    ) -> Result<SsoSession> {
        let code = self.registry.get(code_id).await?;
        let keys = self.registry.keys_for(&code).await?;
        let bundle = signer::sign(
            challenge,
            &code,
            &keys,
            hybrid.unwrap_or(self.config.hybrid_signatures),
        )?;
        self.sessions.issue(challenge, &bundle, &code).await
    }

    /// Recipient side of a chain: the key behind `index` of the chain
    /// `sender_code` derives towards the owned code `recipient_id`.
    pub async fn receive_key(
        &self,
        recipient_id: &str,
        sender_code: &str,
        index: u32,
    ) -> Result<(SecretKey, DerivedAddress)> {
        let recipient = self.registry.get(recipient_id).await?;
        let keys = self.registry.keys_for(&recipient).await?;
        self.chains
            .deriver()
            .derive_receive_key(&keys, sender_code, index)
    }

    /// Recipient side: check a notification reference received from `sender_code`.
    pub async fn verify_notification(
        &self,
        recipient_id: &str,
        sender_code: &str,
        reference: &NotificationReference,
    ) -> Result<bool> {
        let recipient = self.registry.get(recipient_id).await?;
        let keys = self.registry.keys_for(&recipient).await?;
        notification::verify_notification_reference(&keys, sender_code, reference)
    }
}
