use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::price::{truncate_to_midnight, PriceSample, Resolution};
use crate::providers::traits::MarketDataFeed;

/// Live quotes move constantly; refresh on the order of tens of seconds.
const LATEST_TTL: Duration = Duration::from_secs(30);

/// The previous session's close is fixed once the session starts.
const PREVIOUS_CLOSE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// The first sample of the current day only changes at day rollover.
const SESSION_OPEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Historical candles rarely change.
const HISTORY_TTL: Duration = Duration::from_secs(60 * 60);

struct CachedPrice {
    /// `None` is a cached feed failure: the sentinel is served until the
    /// entry expires, so a dead feed is retried once per TTL, not per call.
    value: Option<f64>,
    fetched_at: Instant,
}

struct CachedSeries {
    samples: Vec<PriceSample>,
    start: DateTime<Utc>,
    fetched_at: Instant,
}

/// Cached accessors over the market-data feed.
///
/// Every accessor is tolerant: a network/feed/parse failure degrades to
/// `None` (or an empty series) and is logged, never raised. Cache maps
/// are plain mutex-guarded HashMaps; locks are taken only to copy in and
/// out, never across a feed call, so concurrent misses at worst fetch
/// twice.
pub struct PriceService {
    feed: Arc<dyn MarketDataFeed>,
    latest: Mutex<HashMap<String, CachedPrice>>,
    previous_close: Mutex<HashMap<String, CachedPrice>>,
    session_open: Mutex<HashMap<String, CachedPrice>>,
    history: Mutex<HashMap<(String, Resolution), CachedSeries>>,
}

impl PriceService {
    pub fn new(feed: Arc<dyn MarketDataFeed>) -> Self {
        Self {
            feed,
            latest: Mutex::new(HashMap::new()),
            previous_close: Mutex::new(HashMap::new()),
            session_open: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn feed(&self) -> Arc<dyn MarketDataFeed> {
        Arc::clone(&self.feed)
    }

    /// Latest traded price, or `None` when the feed has nothing usable.
    pub async fn latest(&self, ticker: &str) -> Option<f64> {
        if let Some(value) = cached_price(&self.latest, ticker, LATEST_TTL) {
            return value;
        }

        let value = match self.feed.latest_quote(ticker).await {
            Ok(price) => validate_price(ticker, price),
            Err(e) => {
                log::warn!("latest quote for {ticker} unavailable: {e}");
                None
            }
        };
        store_price(&self.latest, ticker, value);
        value
    }

    /// Close of the prior trading session: the second-to-last candle of a
    /// trailing week of daily data, or the last if only one exists.
    pub async fn previous_close(&self, ticker: &str) -> Option<f64> {
        if let Some(value) = cached_price(&self.previous_close, ticker, PREVIOUS_CLOSE_TTL) {
            return value;
        }

        let value = match self.feed.daily_history(ticker, Utc::now() - chrono::Duration::days(7)).await
        {
            Ok(mut samples) => {
                samples.sort_by_key(|s| s.timestamp);
                let picked = match samples.len() {
                    0 => None,
                    1 => Some(samples[0].price),
                    n => Some(samples[n - 2].price),
                };
                picked.and_then(|p| validate_price(ticker, p))
            }
            Err(e) => {
                log::warn!("previous close for {ticker} unavailable: {e}");
                None
            }
        };
        store_price(&self.previous_close, ticker, value);
        value
    }

    /// First intraday sample stamped within the current calendar day —
    /// the baseline for "since midnight" P/L. Distinct from the previous
    /// close because crypto pairs trade straight through midnight.
    pub async fn session_open_reference(&self, ticker: &str) -> Option<f64> {
        if let Some(value) = cached_price(&self.session_open, ticker, SESSION_OPEN_TTL) {
            return value;
        }

        let today = Utc::now().date_naive();
        let value = match self.feed.intraday_history(ticker).await {
            Ok(samples) => samples
                .into_iter()
                .filter(|s| s.timestamp.date_naive() == today)
                .min_by_key(|s| s.timestamp)
                .and_then(|s| validate_price(ticker, s.price)),
            Err(e) => {
                log::warn!("session open reference for {ticker} unavailable: {e}");
                None
            }
        };
        store_price(&self.session_open, ticker, value);
        value
    }

    /// Candle history from `start` at the requested resolution, sorted by
    /// timestamp. Daily samples are truncated to midnight UTC; intraday
    /// is limited to the feed's trailing window regardless of `start`.
    /// Empty on failure.
    pub async fn history(
        &self,
        ticker: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
    ) -> Vec<PriceSample> {
        {
            let cache = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(&(ticker.to_string(), resolution)) {
                if entry.fetched_at.elapsed() < HISTORY_TTL && entry.start <= start {
                    return entry
                        .samples
                        .iter()
                        .copied()
                        .filter(|s| s.timestamp >= start)
                        .collect();
                }
            }
        }

        let fetched = match resolution {
            Resolution::Daily => self.feed.daily_history(ticker, start).await,
            Resolution::Intraday => self.feed.intraday_history(ticker).await,
        };

        let samples = match fetched {
            Ok(raw) => normalize_series(raw, resolution),
            Err(e) => {
                log::warn!("{resolution} history for {ticker} unavailable: {e}");
                Vec::new()
            }
        };

        {
            let mut cache = self.history.lock().unwrap_or_else(|e| e.into_inner());
            cache.insert(
                (ticker.to_string(), resolution),
                CachedSeries {
                    samples: samples.clone(),
                    start,
                    fetched_at: Instant::now(),
                },
            );
        }

        samples.into_iter().filter(|s| s.timestamp >= start).collect()
    }

    /// Drop every cached entry. Safe at any time — the cost is a refetch,
    /// never corruption.
    pub fn clear_caches(&self) {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.previous_close
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.session_open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Daily candles come stamped at exchange-local open times; pin them to
/// day boundaries and keep one sample per day (the last wins). Intraday
/// is only sorted.
fn normalize_series(mut samples: Vec<PriceSample>, resolution: Resolution) -> Vec<PriceSample> {
    samples.sort_by_key(|s| s.timestamp);
    match resolution {
        Resolution::Daily => {
            let mut normalized: Vec<PriceSample> = Vec::with_capacity(samples.len());
            for sample in samples {
                let midnight = truncate_to_midnight(sample.timestamp);
                match normalized.last_mut() {
                    Some(last) if last.timestamp == midnight => last.price = sample.price,
                    _ => normalized.push(PriceSample {
                        timestamp: midnight,
                        price: sample.price,
                    }),
                }
            }
            normalized
        }
        Resolution::Intraday => samples,
    }
}

fn validate_price(ticker: &str, price: f64) -> Option<f64> {
    if price.is_finite() && price > 0.0 {
        Some(price)
    } else {
        log::warn!("discarding implausible price {price} for {ticker}");
        None
    }
}

fn cached_price(
    cache: &Mutex<HashMap<String, CachedPrice>>,
    ticker: &str,
    ttl: Duration,
) -> Option<Option<f64>> {
    let cache = cache.lock().unwrap_or_else(|e| e.into_inner());
    cache
        .get(ticker)
        .filter(|entry| entry.fetched_at.elapsed() < ttl)
        .map(|entry| entry.value)
}

fn store_price(cache: &Mutex<HashMap<String, CachedPrice>>, ticker: &str, value: Option<f64>) {
    let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
    cache.insert(
        ticker.to_string(),
        CachedPrice {
            value,
            fetched_at: Instant::now(),
        },
    );
}
