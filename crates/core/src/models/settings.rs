use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::CoreError;
use crate::storage::store::KeyValueStore;

/// Store key under which the whole config document is persisted.
const CONFIG_KEY: &str = "config";

/// Fee parameters for the rebalancing planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Flat fee per equity/ETF order, in the ledger currency.
    #[serde(default = "default_equity_fee")]
    pub equity_fee: f64,

    /// Crypto fee as a percentage of the executed value.
    #[serde(default = "default_crypto_fee_pct")]
    pub crypto_fee_pct: f64,
}

fn default_equity_fee() -> f64 {
    1.0
}

fn default_crypto_fee_pct() -> f64 {
    0.29
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            equity_fee: default_equity_fee(),
            crypto_fee_pct: default_crypto_fee_pct(),
        }
    }
}

/// Per-instrument configuration: target allocation and optional display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default)]
    pub target_pct: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// User configuration: target percentages per instrument key plus planner
/// fees. Persisted as a single JSON document in the key-value store so a
/// reload sees exactly what the last save wrote.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub assets: HashMap<String, AssetConfig>,

    #[serde(default)]
    pub settings: PlannerSettings,
}

impl TrackerConfig {
    /// Load the config from the store; a missing or unreadable document
    /// yields the defaults (first run, or a store that was cleared).
    pub fn load(store: &Arc<dyn KeyValueStore>) -> Self {
        match store.get(CONFIG_KEY) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("config document unreadable, using defaults: {e}");
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Persist the config to the store.
    pub fn save(&self, store: &Arc<dyn KeyValueStore>) -> Result<(), CoreError> {
        let raw = serde_json::to_string(self)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize config: {e}")))?;
        store.set(CONFIG_KEY, &raw)
    }

    /// Target percentages per instrument key.
    pub fn targets(&self) -> HashMap<String, f64> {
        self.assets
            .iter()
            .map(|(key, asset)| (key.clone(), asset.target_pct))
            .collect()
    }

    /// Set or update an instrument's target percentage, creating the
    /// asset entry if missing.
    pub fn set_target(&mut self, key: &str, target_pct: f64) {
        self.assets.entry(key.to_string()).or_default().target_pct = target_pct;
    }

    /// Set an instrument's display name, creating the asset entry if missing.
    pub fn set_display_name(&mut self, key: &str, name: &str) {
        self.assets.entry(key.to_string()).or_default().display_name =
            Some(name.trim().to_string());
    }

    /// Display name for a key, falling back to the key itself.
    pub fn display_name(&self, key: &str) -> &str {
        self.assets
            .get(key)
            .and_then(|a| a.display_name.as_deref())
            .unwrap_or(key)
    }

    /// Remove an instrument from the config entirely.
    pub fn remove_asset(&mut self, key: &str) -> bool {
        self.assets.remove(key).is_some()
    }
}
