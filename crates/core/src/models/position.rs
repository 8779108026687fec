use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ledger::{LedgerEntry, QuantityEvent};

/// One aggregated holding, keyed by ISIN (preferred) or product name.
///
/// Recomputed in full on every ledger load — positions are a projection
/// of the ledger, never stored independently of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Grouping key: ISIN when the ledger carries one, else product name.
    pub key: String,

    /// Product name as seen on the most recent ledger row.
    pub name: String,

    /// ISIN, when known.
    pub isin: Option<String>,

    /// Running total of signed trade quantities.
    pub quantity: f64,

    /// Net cash the position has consumed: gross buys plus fees, minus
    /// gross sells and dividends. Computed as the negated sum of the
    /// signed cash deltas, so every cash-affecting row is reflected.
    pub cost_basis: f64,

    /// Resolved price-feed ticker. `None` means "no live data available";
    /// consumers must degrade, not fail.
    pub ticker: Option<String>,
}

/// Aggregate normalized ledger rows into positions.
///
/// Rows are processed in execution order per key so that `quantity` is
/// always the ordered sum of trade quantities. Returned positions are
/// sorted by key for deterministic output.
pub fn aggregate_positions(entries: &[LedgerEntry]) -> Vec<Position> {
    let mut by_key: HashMap<String, Position> = HashMap::new();

    for entry in entries {
        let key = entry.instrument_key().to_string();
        let position = by_key.entry(key.clone()).or_insert_with(|| Position {
            key,
            name: entry.product.clone(),
            isin: entry.isin.clone(),
            quantity: 0.0,
            cost_basis: 0.0,
            ticker: None,
        });

        position.quantity += entry.quantity;
        position.cost_basis -= entry.cash_amount;
        // Later rows may carry a fuller product name or an ISIN the
        // earlier ones lacked.
        if !entry.product.is_empty() {
            position.name = entry.product.clone();
        }
        if position.isin.is_none() {
            position.isin = entry.isin.clone();
        }
    }

    let mut positions: Vec<Position> = by_key.into_values().collect();
    positions.sort_by(|a, b| a.key.cmp(&b.key));
    positions
}

/// Extract the quantity events for one instrument key, in execution order.
pub fn quantity_events_for(entries: &[LedgerEntry], key: &str) -> Vec<QuantityEvent> {
    let mut events: Vec<QuantityEvent> = entries
        .iter()
        .filter(|e| e.instrument_key() == key)
        .map(|e| QuantityEvent {
            timestamp: e.executed_at,
            delta: e.quantity,
        })
        .collect();
    events.sort_by_key(|e| e.timestamp);
    events
}
