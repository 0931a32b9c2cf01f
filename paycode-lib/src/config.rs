//! Configuration for the payment code core.

use serde::{Deserialize, Serialize};

/// Bitcoin network selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    /// Bitcoin mainnet.
    #[default]
    Mainnet,
    /// Bitcoin testnet (testnet3).
    Testnet,
    /// Bitcoin signet.
    Signet,
    /// Bitcoin regtest (local development).
    Regtest,
}

impl BitcoinNetwork {
    /// Get the network name as used by most APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Signet => "signet",
            Self::Regtest => "regtest",
        }
    }

    /// Get the bech32 HRP (human-readable part) for addresses.
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Self::Mainnet => "bc",
            Self::Testnet | Self::Signet => "tb",
            Self::Regtest => "bcrt",
        }
    }
}

impl std::str::FromStr for BitcoinNetwork {
    type Err = crate::PaycodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "signet" => Ok(Self::Signet),
            "regtest" => Ok(Self::Regtest),
            other => Err(crate::PaycodeError::invalid_format(format!(
                "unknown network: {}",
                other
            ))),
        }
    }
}

/// Configuration shared by the derivation, signing and session components.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaycodeConfig {
    /// Network whose address encoding derived addresses use.
    #[serde(default)]
    pub network: BitcoinNetwork,

    /// Number of addresses derived when a chain is created.
    #[serde(default = "default_chain_length")]
    pub default_chain_length: u32,

    /// Lifetime of an SSO session in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,

    /// Whether challenges are signed with the hybrid scheme by default.
    #[serde(default = "default_hybrid")]
    pub hybrid_signatures: bool,
}

fn default_chain_length() -> u32 {
    5
}

fn default_session_ttl() -> i64 {
    24 * 60 * 60
}

fn default_hybrid() -> bool {
    true
}

impl Default for PaycodeConfig {
    fn default() -> Self {
        Self {
            network: BitcoinNetwork::default(),
            default_chain_length: default_chain_length(),
            session_ttl_secs: default_session_ttl(),
            hybrid_signatures: default_hybrid(),
        }
    }
}

impl PaycodeConfig {
    /// Create the default configuration (mainnet, 5 addresses, 24h sessions, hybrid).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the network.
    pub fn with_network(mut self, network: BitcoinNetwork) -> Self {
        self.network = network;
        self
    }

    /// Set the number of addresses derived per new chain.
    pub fn with_chain_length(mut self, count: u32) -> Self {
        self.default_chain_length = count;
        self
    }

    /// Set the session lifetime.
    pub fn with_session_ttl(mut self, secs: i64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// Choose hybrid or classical-only signatures by default.
    pub fn with_hybrid_signatures(mut self, hybrid: bool) -> Self {
        self.hybrid_signatures = hybrid;
        self
    }

    /// Session lifetime as a chrono duration.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PaycodeConfig::default();
        assert_eq!(config.network, BitcoinNetwork::Mainnet);
        assert_eq!(config.default_chain_length, 5);
        assert_eq!(config.session_ttl(), chrono::Duration::hours(24));
        assert!(config.hybrid_signatures);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PaycodeConfig = serde_json::from_str(r#"{"network":"testnet"}"#).unwrap();
        assert_eq!(config.network, BitcoinNetwork::Testnet);
        assert_eq!(config.default_chain_length, 5);
        assert_eq!(config.session_ttl_secs, 86_400);
    }

    #[test]
    fn test_address_prefixes() {
        assert_eq!(BitcoinNetwork::Mainnet.address_prefix(), "bc");
        assert_eq!(BitcoinNetwork::Signet.address_prefix(), "tb");
        assert_eq!(BitcoinNetwork::Regtest.address_prefix(), "bcrt");
        assert_eq!("REGTEST".parse::<BitcoinNetwork>().unwrap(), BitcoinNetwork::Regtest);
        assert!("litecoin".parse::<BitcoinNetwork>().is_err());
    }
}
