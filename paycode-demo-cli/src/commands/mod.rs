//! CLI command implementations

pub mod chains;
pub mod codes;
pub mod scan;
pub mod sessions;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};
use paycode_lib::{PaycodeConfig, PaycodeCoordinator};

use crate::storage::FileKeyStorage;

pub type Coordinator = PaycodeCoordinator<FileKeyStorage>;

/// Name of the optional configuration file in the storage directory
pub const CONFIG_FILE: &str = "config.json";

/// Load `config.json` from the storage directory, or the defaults
pub fn load_config(storage_dir: &Path) -> Result<PaycodeConfig> {
    let path = storage_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(PaycodeConfig::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config in {}", path.display()))
}

/// Open the coordinator over the file store in `storage_dir`
pub fn open(storage_dir: &Path) -> Result<Coordinator> {
    let config = load_config(storage_dir)?;
    tracing::debug!(network = config.network.as_str(), "loaded configuration");
    let storage = FileKeyStorage::open(storage_dir.join("data"))?;
    Ok(PaycodeCoordinator::new(std::sync::Arc::new(storage), config))
}
