use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;

use super::traits::{MarketDataFeed, SymbolCandidate};
use crate::errors::CoreError;
use crate::models::price::PriceSample;

const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";

/// Hourly candles over the last five trading days — the trailing window
/// behind `intraday_history`.
const INTRADAY_INTERVAL: &str = "60m";
const INTRADAY_RANGE: &str = "5d";

/// Yahoo Finance feed.
///
/// - **Free**: no API key required (unofficial public API).
/// - **Coverage**: global equities, ETFs, funds, crypto pairs.
/// - **Quotes/candles**: via the `yahoo_finance_api` crate.
/// - **Symbol search**: the `/v1/finance/search` endpoint, queried
///   directly — the endpoint rejects requests without a browser-like
///   User-Agent, hence the explicit header.
pub struct YahooFeed {
    connector: yahoo_finance_api::YahooConnector,
    search_client: Client,
}

impl YahooFeed {
    pub fn new() -> Result<Self, CoreError> {
        let connector = yahoo_finance_api::YahooConnector::new().map_err(|e| CoreError::Feed {
            provider: "Yahoo Finance".into(),
            message: format!("Failed to create connector: {e}"),
        })?;

        let search_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("Mozilla/5.0")
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self {
            connector,
            search_client,
        })
    }

    /// Convert a `chrono::DateTime<Utc>` to `time::OffsetDateTime`.
    fn to_offset_datetime(ts: DateTime<Utc>) -> Result<OffsetDateTime, CoreError> {
        OffsetDateTime::from_unix_timestamp(ts.timestamp()).map_err(|e| CoreError::Feed {
            provider: "Yahoo Finance".into(),
            message: format!("Invalid timestamp {ts}: {e}"),
        })
    }

    /// Map raw quotes to price samples, skipping any with an
    /// unrepresentable timestamp.
    fn quotes_to_samples(quotes: &[yahoo_finance_api::Quote]) -> Vec<PriceSample> {
        quotes
            .iter()
            .filter_map(|q| {
                let timestamp = DateTime::from_timestamp(q.timestamp, 0)?;
                Some(PriceSample {
                    timestamp,
                    price: q.close,
                })
            })
            .collect()
    }
}

// ── Search endpoint response types ──────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Deserialize)]
struct SearchQuote {
    symbol: Option<String>,
    #[serde(rename = "shortname")]
    short_name: Option<String>,
    #[serde(rename = "longname")]
    long_name: Option<String>,
    exchange: Option<String>,
    #[serde(rename = "quoteType")]
    quote_type: Option<String>,
}

#[async_trait]
impl MarketDataFeed for YahooFeed {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    async fn latest_quote(&self, ticker: &str) -> Result<f64, CoreError> {
        let resp = self
            .connector
            .get_latest_quotes(ticker, "1d")
            .await
            .map_err(|e| CoreError::Feed {
                provider: "Yahoo Finance".into(),
                message: format!("Failed to fetch latest quote for {ticker}: {e}"),
            })?;

        let quote = resp.last_quote().map_err(|e| CoreError::Feed {
            provider: "Yahoo Finance".into(),
            message: format!("No quote data for {ticker}: {e}"),
        })?;

        Ok(quote.close)
    }

    async fn daily_history(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
    ) -> Result<Vec<PriceSample>, CoreError> {
        let start_odt = Self::to_offset_datetime(start)?;
        let end_odt = Self::to_offset_datetime(Utc::now())?;

        let resp = self
            .connector
            .get_quote_history(ticker, start_odt, end_odt)
            .await
            .map_err(|e| CoreError::Feed {
                provider: "Yahoo Finance".into(),
                message: format!("Failed to fetch daily history for {ticker}: {e}"),
            })?;

        let quotes = resp.quotes().map_err(|e| CoreError::Feed {
            provider: "Yahoo Finance".into(),
            message: format!("Failed to parse daily quotes for {ticker}: {e}"),
        })?;

        Ok(Self::quotes_to_samples(&quotes))
    }

    async fn intraday_history(&self, ticker: &str) -> Result<Vec<PriceSample>, CoreError> {
        let resp = self
            .connector
            .get_quote_range(ticker, INTRADAY_INTERVAL, INTRADAY_RANGE)
            .await
            .map_err(|e| CoreError::Feed {
                provider: "Yahoo Finance".into(),
                message: format!("Failed to fetch intraday history for {ticker}: {e}"),
            })?;

        let quotes = resp.quotes().map_err(|e| CoreError::Feed {
            provider: "Yahoo Finance".into(),
            message: format!("Failed to parse intraday quotes for {ticker}: {e}"),
        })?;

        Ok(Self::quotes_to_samples(&quotes))
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolCandidate>, CoreError> {
        let resp: SearchResponse = self
            .search_client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| CoreError::Feed {
                provider: "Yahoo Finance".into(),
                message: format!("Failed to parse search response for '{query}': {e}"),
            })?;

        let candidates = resp
            .quotes
            .into_iter()
            .filter_map(|q| {
                let symbol = q.symbol?;
                Some(SymbolCandidate {
                    name: q
                        .short_name
                        .or(q.long_name)
                        .unwrap_or_else(|| symbol.clone()),
                    symbol,
                    exchange: q.exchange.unwrap_or_default(),
                    quote_type: q.quote_type.unwrap_or_default(),
                })
            })
            .collect();

        Ok(candidates)
    }
}
