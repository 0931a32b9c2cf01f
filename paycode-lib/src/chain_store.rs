//! Persistence of payment chains.
//!
//! Chains are append-only: the only mutations are extension with new
//! indices, recording the notification and recording indexer activity.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::chain::ChainDeriver;
use crate::collection::{Collection, PAYMENT_CHAINS};
use crate::config::PaycodeConfig;
use crate::keys::PaymentCodeKeys;
use crate::models::{NotificationReference, PaymentChain};
use crate::secure_storage::SecureKeyStorage;
use crate::{PaycodeError, Result};

/// Indexer-reported state of one address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressActivity {
    pub used: bool,
    pub balance: u64,
    pub transactions: u64,
}

/// Owner of the `payment_chains` collection.
pub struct ChainStore<S: SecureKeyStorage> {
    chains: Collection<PaymentChain, S>,
    deriver: ChainDeriver,
}

fn find_mut<'a>(chains: &'a mut [PaymentChain], chain_id: &str) -> Result<&'a mut PaymentChain> {
    chains
        .iter_mut()
        .find(|c| c.id == chain_id)
        .ok_or_else(|| PaycodeError::not_found("payment chain", chain_id))
}

impl<S: SecureKeyStorage> ChainStore<S> {
    pub fn new(storage: Arc<S>, config: &PaycodeConfig) -> Self {
        Self {
            chains: Collection::new(storage, PAYMENT_CHAINS),
            deriver: ChainDeriver::new(config.network),
        }
    }

    /// Deriver used for extensions, configured for this store's network.
    pub fn deriver(&self) -> &ChainDeriver {
        &self.deriver
    }

    /// Persist a newly derived chain.
    #[instrument(skip(self, chain), fields(chain_id = %chain.id))]
    pub async fn save(&self, chain: PaymentChain) -> Result<PaymentChain> {
        let saved = self
            .chains
            .update(|chains| {
                if chains.iter().any(|c| c.id == chain.id) {
                    return Err(PaycodeError::already_exists("payment chain", &chain.id));
                }
                chains.push(chain.clone());
                Ok(chain)
            })
            .await?;
        info!(addresses = saved.addresses.len(), "payment chain saved");
        Ok(saved)
    }

    pub async fn list(&self) -> Result<Vec<PaymentChain>> {
        self.chains.load().await
    }

    pub async fn get(&self, chain_id: &str) -> Result<PaymentChain> {
        self.chains
            .load()
            .await?
            .into_iter()
            .find(|c| c.id == chain_id)
            .ok_or_else(|| PaycodeError::not_found("payment chain", chain_id))
    }

    /// Chains whose sender is the payment code `payment_code_id`.
    pub async fn list_for_code(&self, payment_code_id: &str) -> Result<Vec<PaymentChain>> {
        Ok(self
            .chains
            .load()
            .await?
            .into_iter()
            .filter(|c| c.payment_code_id == payment_code_id)
            .collect())
    }

    /// Append `additional` addresses to a stored chain.
    #[instrument(skip(self, sender_keys))]
    pub async fn extend(
        &self,
        chain_id: &str,
        sender_keys: &PaymentCodeKeys,
        additional: u32,
    ) -> Result<PaymentChain> {
        let deriver = self.deriver;
        self.chains
            .update(|chains| {
                let chain = find_mut(chains, chain_id)?;
                deriver.extend_chain(chain, sender_keys, additional)?;
                Ok(chain.clone())
            })
            .await
    }

    /// Record the notification reference of a chain.
    ///
    /// # Errors
    /// - `NotFound` if no chain has this id
    /// - `AlreadyExists` if a notification was already recorded
    #[instrument(skip(self, reference))]
    pub async fn mark_notification_sent(
        &self,
        chain_id: &str,
        reference: &NotificationReference,
    ) -> Result<PaymentChain> {
        self.chains
            .update(|chains| {
                let chain = find_mut(chains, chain_id)?;
                if chain.notification_sent {
                    return Err(PaycodeError::already_exists("notification", chain_id));
                }
                chain.notification_reference = Some(reference.clone());
                chain.notification_sent = true;
                Ok(chain.clone())
            })
            .await
    }

    /// Apply indexer-reported activity to one address.
    ///
    /// `used` is sticky: once set it stays set.
    #[instrument(skip(self))]
    pub async fn record_activity(
        &self,
        chain_id: &str,
        index: u32,
        activity: AddressActivity,
    ) -> Result<PaymentChain> {
        self.chains
            .update(|chains| {
                let chain = find_mut(chains, chain_id)?;
                let address = chain
                    .addresses
                    .iter_mut()
                    .find(|a| a.index == index)
                    .ok_or_else(|| {
                        PaycodeError::not_found("address", format!("{}#{}", chain_id, index))
                    })?;
                address.used |= activity.used;
                address.balance = activity.balance;
                address.transactions = activity.transactions;
                Ok(chain.clone())
            })
            .await
    }

    /// Delete a chain none of whose addresses has been used.
    ///
    /// # Errors
    /// - `NotFound` if no chain has this id
    /// - `InUse` if any address has been used
    #[instrument(skip(self))]
    pub async fn delete(&self, chain_id: &str) -> Result<()> {
        self.chains
            .update(|chains| {
                let position = chains
                    .iter()
                    .position(|c| c.id == chain_id)
                    .ok_or_else(|| PaycodeError::not_found("payment chain", chain_id))?;
                let used = chains[position].addresses.iter().filter(|a| a.used).count();
                if used > 0 {
                    return Err(PaycodeError::in_use(
                        chain_id,
                        format!("{} address(es) already used", used),
                    ));
                }
                chains.remove(position);
                Ok(())
            })
            .await?;
        info!("payment chain deleted");
        Ok(())
    }
}
