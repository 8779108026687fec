use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point on a reconstructed per-instrument value timeline.
///
/// The core computes these — the frontend only renders. Zero-quantity
/// points are kept so a price-only line (what the instrument was worth
/// before it was held) can still be drawn by a consumer that wants one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationPoint {
    pub timestamp: DateTime<Utc>,

    /// Units held as of this instant (forward-filled from the trade history).
    pub quantity: f64,

    /// Close price at this instant.
    pub price: f64,

    /// `quantity * price`.
    pub value: f64,
}
