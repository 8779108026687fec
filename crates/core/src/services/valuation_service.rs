use chrono::{DateTime, Duration, Utc};

use crate::models::ledger::{cumulative_quantities, quantity_at, QuantityEvent};
use crate::models::price::{stitch_price_series, Resolution};
use crate::models::valuation::ValuationPoint;
use crate::services::price_service::PriceService;

/// How far back intraday candles are requested when reconstructing the
/// recent end of a value timeline.
const INTRADAY_WINDOW_DAYS: i64 = 7;

/// Rebuilds a continuous per-instrument value timeline from trade events
/// and candle history.
///
/// The trade history is a sparse quantity step function; the candle
/// history is an irregular price timeline at two resolutions. The two
/// are reconciled by stitching the price series (intraday wins ties) and
/// forward-filling the quantity onto every price instant, so the output
/// keeps exact intraday jumps at trade time while the daily backbone
/// covers the years before.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Reconstruct the (timestamp, quantity, price, value) series for one
    /// instrument from `floor` through now.
    ///
    /// Returns an empty series when no candles exist at either
    /// resolution — a reconciliation gap, not an error. Instruments with
    /// an unresolved ticker are the caller's responsibility to skip.
    pub async fn reconstruct(
        &self,
        price_service: &PriceService,
        events: &[QuantityEvent],
        ticker: &str,
        floor: DateTime<Utc>,
    ) -> Vec<ValuationPoint> {
        // Sparse quantity step function anchored at trade instants.
        let steps = cumulative_quantities(events);

        let daily = price_service
            .history(ticker, Resolution::Daily, floor)
            .await;
        let intraday = price_service
            .history(
                ticker,
                Resolution::Intraday,
                Utc::now() - Duration::days(INTRADAY_WINDOW_DAYS),
            )
            .await;

        let stitched = stitch_price_series(daily, intraday);
        if stitched.is_empty() {
            return Vec::new();
        }

        // Forward-fill the quantity onto each price instant: a sample
        // between two trades inherits the quantity as of the most recent
        // trade at or before it, zero before the first trade. Zero-quantity
        // points stay in — the price line is still worth drawing.
        stitched
            .into_iter()
            .map(|sample| {
                let quantity = quantity_at(&steps, sample.timestamp);
                ValuationPoint {
                    timestamp: sample.timestamp,
                    quantity,
                    price: sample.price,
                    value: quantity * sample.price,
                }
            })
            .collect()
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}
