pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;
pub mod symbols;

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use errors::CoreError;
use models::ledger::{LedgerEntry, QuantityEvent};
use models::position::{aggregate_positions, quantity_events_for, Position};
use models::price::QuoteSnapshot;
use models::rebalance::{PositionSnapshot, RebalancePlan};
use models::settings::TrackerConfig;
use models::valuation::ValuationPoint;
use providers::traits::MarketDataFeed;
use services::price_service::PriceService;
use services::rebalance_service::RebalanceService;
use services::refresher::PriceRefresher;
use services::valuation_service::ValuationService;
use storage::store::KeyValueStore;
use symbols::cache::SymbolCache;
use symbols::resolver::TickerResolver;

/// Default lookback for reconstructed value timelines.
const HISTORY_FLOOR_DAYS: i64 = 5 * 365;

/// Main entry point for the LedgerLens core library.
///
/// Holds the loaded ledger, the positions derived from it, and the
/// services that price them. The ledger itself arrives pre-normalized
/// from the upload layer; persistence of tickers and config goes through
/// the supplied key-value store.
#[must_use]
pub struct LedgerLens {
    entries: Vec<LedgerEntry>,
    positions: Vec<Position>,
    config: TrackerConfig,
    store: Arc<dyn KeyValueStore>,
    symbol_cache: SymbolCache,
    resolver: TickerResolver,
    price_service: PriceService,
    refresher: PriceRefresher,
    valuation_service: ValuationService,
    rebalance_service: RebalanceService,
}

impl std::fmt::Debug for LedgerLens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerLens")
            .field("entries", &self.entries.len())
            .field("positions", &self.positions.len())
            .field("targets", &self.config.assets.len())
            .finish()
    }
}

impl LedgerLens {
    /// Build a tracker over a persistence store and a market-data feed.
    /// Config is read from the store immediately; the ledger is loaded
    /// separately via [`load_ledger`](Self::load_ledger).
    pub fn new(store: Arc<dyn KeyValueStore>, feed: Arc<dyn MarketDataFeed>) -> Self {
        let config = TrackerConfig::load(&store);
        let symbol_cache = SymbolCache::new(Arc::clone(&store));
        let resolver = TickerResolver::new(symbol_cache.clone(), Arc::clone(&feed));
        let price_service = PriceService::new(Arc::clone(&feed));
        let refresher = PriceRefresher::new(feed);

        Self {
            entries: Vec::new(),
            positions: Vec::new(),
            config,
            store,
            symbol_cache,
            resolver,
            price_service,
            refresher,
            valuation_service: ValuationService::new(),
            rebalance_service: RebalanceService::new(),
        }
    }

    /// Default valuation lookback: five years back from now.
    pub fn default_floor() -> DateTime<Utc> {
        Utc::now() - Duration::days(HISTORY_FLOOR_DAYS)
    }

    // ── Ledger & Positions ──────────────────────────────────────────

    /// Replace the loaded ledger and recompute all positions from it.
    /// Tickers resolved on a previous load are re-attached from the
    /// symbol cache without touching the network.
    pub fn load_ledger(&mut self, entries: Vec<LedgerEntry>) {
        self.positions = aggregate_positions(&entries);
        self.entries = entries;

        for position in &mut self.positions {
            position.ticker = position
                .isin
                .as_deref()
                .and_then(|isin| self.symbol_cache.ticker_for(isin))
                .or_else(|| self.symbol_cache.ticker_for(&position.name));
        }
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    #[must_use]
    pub fn position(&self, key: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.key == key)
    }

    /// Quantity events for one instrument, in execution order.
    #[must_use]
    pub fn quantity_events(&self, key: &str) -> Vec<QuantityEvent> {
        quantity_events_for(&self.entries, key)
    }

    // ── Ticker Resolution ───────────────────────────────────────────

    /// Resolve tickers for every position that still lacks one, and cache
    /// display names on first sight. Returns how many positions ended up
    /// with a ticker. Unresolvable instruments keep `None` and simply
    /// have no live data.
    pub async fn resolve_tickers(&mut self) -> usize {
        for index in 0..self.positions.len() {
            if self.positions[index].ticker.is_some() {
                continue;
            }
            let name = self.positions[index].name.clone();
            let isin = self.positions[index].isin.clone();

            self.positions[index].ticker = self.resolver.resolve(&name, isin.as_deref()).await;

            let key = self.positions[index].key.clone();
            if self.symbol_cache.display_name(&key).is_none() && !name.is_empty() {
                self.symbol_cache.set_display_name(&key, &name);
            }
        }

        self.positions.iter().filter(|p| p.ticker.is_some()).count()
    }

    /// Display name for a key: config override, then cached name, then
    /// the position's product name, then the key itself.
    #[must_use]
    pub fn display_name(&self, key: &str) -> String {
        if let Some(asset) = self.config.assets.get(key) {
            if let Some(name) = &asset.display_name {
                return name.clone();
            }
        }
        if let Some(name) = self.symbol_cache.display_name(key) {
            return name;
        }
        self.position(key)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| key.to_string())
    }

    // ── Valuation ───────────────────────────────────────────────────

    /// Reconstruct the value timeline of one position from `floor`
    /// through now. Positions without a resolved ticker yield an empty
    /// series, as do instruments with no overlapping price history.
    pub async fn valuation_history(&self, key: &str, floor: DateTime<Utc>) -> Vec<ValuationPoint> {
        let Some(position) = self.position(key) else {
            return Vec::new();
        };
        let Some(ticker) = position.ticker.as_deref() else {
            return Vec::new();
        };

        let events = self.quantity_events(key);
        self.valuation_service
            .reconstruct(&self.price_service, &events, ticker, floor)
            .await
    }

    /// Latest / previous-close / session-open bundle for one ticker.
    pub async fn quote_snapshot(&self, ticker: &str) -> QuoteSnapshot {
        QuoteSnapshot {
            latest: self.price_service.latest(ticker).await,
            previous_close: self.price_service.previous_close(ticker).await,
            session_open: self.price_service.session_open_reference(ticker).await,
        }
    }

    // ── Rebalancing ─────────────────────────────────────────────────

    /// Plan trades moving the current allocation toward the configured
    /// targets. Positions whose ticker is unresolved (or whose quote is
    /// unavailable) participate with an unknown price and are never
    /// traded.
    pub async fn rebalance_plan(&self, budget: f64, prevent_sell: bool) -> RebalancePlan {
        let mut snapshots: BTreeMap<String, PositionSnapshot> = BTreeMap::new();

        for position in &self.positions {
            let price = match position.ticker.as_deref() {
                Some(ticker) => self.price_service.latest(ticker).await,
                None => None,
            };
            let value = price.map(|p| p * position.quantity).unwrap_or(0.0);
            let is_crypto = position
                .ticker
                .as_deref()
                .map(is_crypto_ticker)
                .unwrap_or(false);

            snapshots.insert(
                position.key.clone(),
                PositionSnapshot {
                    value,
                    price,
                    is_crypto,
                },
            );
        }

        let targets: BTreeMap<String, f64> = self.config.targets().into_iter().collect();
        self.rebalance_service.plan(
            &snapshots,
            &targets,
            budget,
            prevent_sell,
            &self.config.settings,
        )
    }

    // ── Background Refresh ──────────────────────────────────────────

    /// The background quote refresher. Call `start()` on it once the
    /// watchlist matters; reads stay non-blocking either way.
    #[must_use]
    pub fn refresher(&self) -> &PriceRefresher {
        &self.refresher
    }

    /// Register every resolved position ticker with the refresher.
    pub fn watch_positions(&self) {
        for position in &self.positions {
            if let Some(ticker) = position.ticker.as_deref() {
                self.refresher.watch(ticker);
            }
        }
    }

    // ── Configuration ───────────────────────────────────────────────

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Set a target percentage and persist the config.
    pub fn set_target(&mut self, key: &str, target_pct: f64) -> Result<(), CoreError> {
        if !(0.0..=100.0).contains(&target_pct) {
            return Err(CoreError::ValidationError(format!(
                "target percentage {target_pct} for '{key}' must be between 0 and 100"
            )));
        }
        self.config.set_target(key, target_pct);
        self.config.save(&self.store)
    }

    /// Set a display name and persist the config.
    pub fn set_display_name(&mut self, key: &str, name: &str) -> Result<(), CoreError> {
        self.config.set_display_name(key, name);
        self.config.save(&self.store)
    }

    /// Remove an instrument's config entry and persist.
    pub fn remove_asset(&mut self, key: &str) -> Result<bool, CoreError> {
        let removed = self.config.remove_asset(key);
        if removed {
            self.config.save(&self.store)?;
        }
        Ok(removed)
    }

    /// Update planner fees (pass `None` to keep a value) and persist.
    pub fn update_planner_settings(
        &mut self,
        equity_fee: Option<f64>,
        crypto_fee_pct: Option<f64>,
    ) -> Result<(), CoreError> {
        if let Some(fee) = equity_fee {
            if !fee.is_finite() || fee < 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "equity fee {fee} must be a non-negative amount"
                )));
            }
            self.config.settings.equity_fee = fee;
        }
        if let Some(pct) = crypto_fee_pct {
            if !pct.is_finite() || pct < 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "crypto fee percentage {pct} must be non-negative"
                )));
            }
            self.config.settings.crypto_fee_pct = pct;
        }
        self.config.save(&self.store)
    }

    // ── Cache Management ────────────────────────────────────────────

    /// Drop all price caches. Next reads refetch; staleness is the only
    /// thing cleared.
    pub fn clear_price_caches(&self) {
        self.price_service.clear_caches();
    }
}

/// Crypto positions carry pair-form tickers (`BTC-EUR`); everything else
/// on the feed uses plain or suffixed symbols.
fn is_crypto_ticker(ticker: &str) -> bool {
    ticker.contains('-')
}
