use chrono::{Duration, Utc};
use std::sync::Arc;

use super::cache::SymbolCache;
use crate::providers::traits::{MarketDataFeed, SymbolCandidate};

/// Market-suffix variants probed when an input already looks like a
/// ticker: bare, then the regional listings the broker ledger actually
/// contains (Xetra, Frankfurt, Amsterdam).
const SUFFIX_VARIANTS: &[&str] = &["", ".DE", ".F", ".AS"];

/// Instrument types a search result may have to be considered.
const VALID_QUOTE_TYPES: &[&str] = &["EQUITY", "ETF", "MUTUALFUND"];

/// Trading venues tried first among search results. STU (Stuttgart)
/// proxies TradeGate on the feed; the rest are the common EUR venues.
const PREFERRED_EXCHANGES: &[&str] = &["STU", "GER", "AMS", "PAR", "MIL", "BRU", "DUB"];

/// Maps a free-text (product-name, identifier) pair to a validated
/// price-feed ticker.
///
/// Resolution is a fixed pipeline — cache, direct validation, static
/// fallback, feed search — where the first success wins and every step
/// is best-effort: a feed error fails the step, never the call. The only
/// mutation is the cache write on success, which makes the second
/// resolution of the same pair a pure lookup.
pub struct TickerResolver {
    cache: SymbolCache,
    feed: Arc<dyn MarketDataFeed>,
}

impl TickerResolver {
    pub fn new(cache: SymbolCache, feed: Arc<dyn MarketDataFeed>) -> Self {
        Self { cache, feed }
    }

    /// Resolve a product name plus optional identifier (ISIN) to a
    /// ticker. `None` means "no live data available" — callers must
    /// carry on without a price, not fail.
    pub async fn resolve(&self, name: &str, identifier: Option<&str>) -> Option<String> {
        // 1. Cache, by identifier then by name. A cached mapping was
        //    validated when it was written and is trusted as-is.
        if let Some(id) = identifier {
            if let Some(ticker) = self.cache.ticker_for(id) {
                return Some(ticker);
            }
        }
        if let Some(ticker) = self.cache.ticker_for(name) {
            return Some(ticker);
        }

        // 2. The input itself may already be a ticker (possibly missing
        //    its market suffix).
        if let Some(ticker) = self.validate_direct(name).await {
            log::debug!("resolved '{name}' directly to {ticker}");
            self.persist(name, identifier, &ticker);
            return Some(ticker);
        }

        // 3. Last-resort table for recurring instruments the search
        //    endpoint matches poorly.
        if let Some(ticker) = static_fallback(name) {
            log::debug!("resolved '{name}' via fallback table to {ticker}");
            self.persist(name, identifier, ticker);
            return Some(ticker.to_string());
        }

        // 4. Feed symbol search, identifier first (ISINs search cleanly).
        for query in [identifier, Some(name)].into_iter().flatten() {
            if query.trim().is_empty() {
                continue;
            }
            if let Some(ticker) = self.search_and_validate(query).await {
                log::debug!("resolved '{name}' via search ('{query}') to {ticker}");
                self.persist(name, identifier, &ticker);
                return Some(ticker);
            }
        }

        log::debug!("could not resolve '{name}' (identifier {identifier:?})");
        None
    }

    /// Try the raw input as a ticker. Inputs of the form "TICKER | ISIN"
    /// yield both halves as candidates; each candidate is probed with
    /// the suffix variants until one returns history.
    async fn validate_direct(&self, input: &str) -> Option<String> {
        let candidates: Vec<&str> = if input.contains('|') {
            input.split('|').map(str::trim).collect()
        } else {
            vec![input.trim()]
        };

        for candidate in candidates {
            if !looks_like_ticker(candidate) {
                continue;
            }
            for suffix in SUFFIX_VARIANTS {
                let ticker = format!("{candidate}{suffix}");
                if self.probe(&ticker).await {
                    return Some(ticker);
                }
            }
        }
        None
    }

    /// Search the feed and return the first candidate that both passes
    /// the type filter and actually serves history. Preferred venues get
    /// a full first pass before anything else is probed.
    async fn search_and_validate(&self, query: &str) -> Option<String> {
        let results = match self.feed.search(query).await {
            Ok(results) => results,
            Err(e) => {
                log::warn!("symbol search for '{query}' failed: {e}");
                return None;
            }
        };

        let eligible: Vec<&SymbolCandidate> = results
            .iter()
            .filter(|c| VALID_QUOTE_TYPES.contains(&c.quote_type.as_str()))
            .collect();

        for candidate in eligible
            .iter()
            .filter(|c| PREFERRED_EXCHANGES.contains(&c.exchange.as_str()))
            .chain(
                eligible
                    .iter()
                    .filter(|c| !PREFERRED_EXCHANGES.contains(&c.exchange.as_str())),
            )
        {
            if self.probe(&candidate.symbol).await {
                return Some(candidate.symbol.clone());
            }
        }
        None
    }

    /// Quick existence check: a ticker is valid when the feed serves at
    /// least one daily candle for it. The window spans a few days so
    /// weekends and holidays don't fail a valid symbol.
    async fn probe(&self, ticker: &str) -> bool {
        let start = Utc::now() - Duration::days(5);
        match self.feed.daily_history(ticker, start).await {
            Ok(samples) => !samples.is_empty(),
            Err(_) => false,
        }
    }

    /// Persist a successful resolution under the identifier when there
    /// is one, else under the name. Overwrites are harmless.
    fn persist(&self, name: &str, identifier: Option<&str>, ticker: &str) {
        let key = identifier.filter(|id| !id.is_empty()).unwrap_or(name);
        if !key.is_empty() {
            self.cache.set_ticker(key, ticker);
        }
    }
}

/// Heuristic gate before suffix probing: short, no spaces, only the
/// characters tickers and ISINs are made of.
fn looks_like_ticker(input: &str) -> bool {
    !input.is_empty()
        && input.len() <= 12
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Hardcoded mappings for instruments that recur in these ledgers but
/// resolve poorly through search.
fn static_fallback(name: &str) -> Option<&'static str> {
    let upper = name.to_uppercase();
    if upper.contains("VANGUARD FTSE ALL-WORLD") {
        Some("VWCE.DE")
    } else if upper.starts_with("BITCOIN") {
        Some("BTC-EUR")
    } else if upper.starts_with("ETHEREUM") {
        Some("ETH-EUR")
    } else {
        None
    }
}
