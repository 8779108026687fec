use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::price::PriceSample;

/// One candidate from a symbol search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolCandidate {
    /// Ticker symbol (e.g. "VWCE.DE").
    pub symbol: String,

    /// Short display name (e.g. "Vanguard FTSE All-World UCITS ETF").
    pub name: String,

    /// Exchange tag as the feed reports it (e.g. "STU", "AMS").
    pub exchange: String,

    /// Instrument type (e.g. "EQUITY", "ETF", "MUTUALFUND").
    pub quote_type: String,
}

/// Trait abstraction over the external market-data feed.
///
/// One implementation per upstream API; if an API stops working or
/// changes shape, only that implementation is touched. All methods carry
/// short timeouts inside the implementation — callers above the service
/// layer never see a hang, only an `Err` that degrades to a sentinel.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Human-readable name of this feed (for logs/errors).
    fn name(&self) -> &str;

    /// Latest traded price for a ticker.
    async fn latest_quote(&self, ticker: &str) -> Result<f64, CoreError>;

    /// Daily close candles from `start` through now.
    async fn daily_history(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
    ) -> Result<Vec<PriceSample>, CoreError>;

    /// Sub-daily close candles for the feed's short trailing window
    /// (on the order of a trading week).
    async fn intraday_history(&self, ticker: &str) -> Result<Vec<PriceSample>, CoreError>;

    /// Free-text / identifier symbol search.
    async fn search(&self, query: &str) -> Result<Vec<SymbolCandidate>, CoreError>;
}
