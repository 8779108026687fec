use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized broker-ledger row.
///
/// The upload/normalization layer produces these — column renaming,
/// encoding quirks and transaction-type classification all happen before
/// the core ever sees a row. The core consumes them read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Execution instant (UTC). Intraday precision is preserved so that
    /// same-day trades keep their ordering.
    pub executed_at: DateTime<Utc>,

    /// Product name as the broker prints it (e.g. "VANGUARD FTSE ALL-WORLD UCITS ETF").
    pub product: String,

    /// ISIN when the broker supplies one.
    #[serde(default)]
    pub isin: Option<String>,

    /// Signed quantity delta: positive for buys, negative for sells.
    pub quantity: f64,

    /// Signed cash delta: negative when cash leaves the account (buys, fees),
    /// positive when it comes back (sells, dividends).
    pub cash_amount: f64,
}

impl LedgerEntry {
    /// The key used to group rows into one position: ISIN when present,
    /// otherwise the product name.
    pub fn instrument_key(&self) -> &str {
        self.isin.as_deref().unwrap_or(&self.product)
    }
}

/// A signed quantity change at one instant, derived from a ledger row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantityEvent {
    pub timestamp: DateTime<Utc>,
    pub delta: f64,
}

/// Collapse same-instant events (summing their deltas) and return the
/// running cumulative quantity as a sparse step function, ordered by time.
///
/// The result is a pure running sum: an oversell simply drives the
/// cumulative quantity negative rather than being rejected.
pub fn cumulative_quantities(events: &[QuantityEvent]) -> Vec<(DateTime<Utc>, f64)> {
    let mut collapsed: std::collections::BTreeMap<DateTime<Utc>, f64> =
        std::collections::BTreeMap::new();
    for event in events {
        *collapsed.entry(event.timestamp).or_insert(0.0) += event.delta;
    }

    let mut running = 0.0;
    collapsed
        .into_iter()
        .map(|(ts, delta)| {
            running += delta;
            (ts, running)
        })
        .collect()
}

/// Quantity held at `instant`: the cumulative quantity as of the most
/// recent step at or before it, zero before the first step.
pub fn quantity_at(steps: &[(DateTime<Utc>, f64)], instant: DateTime<Utc>) -> f64 {
    match steps.binary_search_by_key(&instant, |(ts, _)| *ts) {
        Ok(idx) => steps[idx].1,
        Err(0) => 0.0,
        Err(idx) => steps[idx - 1].1,
    }
}
