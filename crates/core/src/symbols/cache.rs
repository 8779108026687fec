use std::sync::Arc;

use crate::storage::store::KeyValueStore;

const TICKER_PREFIX: &str = "ticker:";
const NAME_PREFIX: &str = "name:";

/// Persistent instrument-key → ticker (and key → display-name) mappings.
///
/// Once a key has been validated against the price feed its mapping is
/// cached indefinitely; nothing here re-validates or auto-deletes. Writes
/// are best-effort: a failing backend costs a re-resolution on the next
/// run, never a crash, so set failures are logged and swallowed.
#[derive(Clone)]
pub struct SymbolCache {
    store: Arc<dyn KeyValueStore>,
}

impl SymbolCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Cached ticker for an instrument key (ISIN or product name).
    pub fn ticker_for(&self, key: &str) -> Option<String> {
        self.store.get(&format!("{TICKER_PREFIX}{key}"))
    }

    /// Persist a key → ticker mapping. Overwriting with the same value
    /// is harmless; last write wins.
    pub fn set_ticker(&self, key: &str, ticker: &str) {
        if let Err(e) = self.store.set(&format!("{TICKER_PREFIX}{key}"), ticker) {
            log::warn!("failed to persist ticker mapping {key} -> {ticker}: {e}");
        }
    }

    /// Cached display name for an instrument key.
    pub fn display_name(&self, key: &str) -> Option<String> {
        self.store.get(&format!("{NAME_PREFIX}{key}"))
    }

    pub fn set_display_name(&self, key: &str, name: &str) {
        if let Err(e) = self.store.set(&format!("{NAME_PREFIX}{key}"), name) {
            log::warn!("failed to persist display name for {key}: {e}");
        }
    }
}
