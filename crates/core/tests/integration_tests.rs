// ═══════════════════════════════════════════════════════════════════
// Integration Tests — the LedgerLens facade end to end: ledger load,
// ticker resolution, valuation, rebalancing, config persistence
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use ledgerlens_core::errors::CoreError;
use ledgerlens_core::models::ledger::LedgerEntry;
use ledgerlens_core::models::price::PriceSample;
use ledgerlens_core::models::rebalance::Action;
use ledgerlens_core::providers::traits::{MarketDataFeed, SymbolCandidate};
use ledgerlens_core::storage::store::{KeyValueStore, MemoryStore};
use ledgerlens_core::LedgerLens;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(n)
}

// ═══════════════════════════════════════════════════════════════════
// Mock Feed
// ═══════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MockFeed {
    latest: HashMap<String, f64>,
    daily: HashMap<String, Vec<PriceSample>>,
    search_results: HashMap<String, Vec<SymbolCandidate>>,
}

impl MockFeed {
    /// A feed that knows one ETF (searchable by ISIN) and one crypto
    /// pair, with a recent daily series for each.
    fn seeded() -> Self {
        let mut feed = Self::default();

        feed.latest.insert("VWCE.DE".to_string(), 110.0);
        feed.latest.insert("BTC-EUR".to_string(), 50_000.0);

        let series = |base: f64| -> Vec<PriceSample> {
            (0..30)
                .map(|n| PriceSample {
                    timestamp: Utc::now() - chrono::Duration::days(30 - n),
                    price: base + n as f64,
                })
                .collect()
        };
        feed.daily.insert("VWCE.DE".to_string(), series(80.0));
        feed.daily.insert("BTC-EUR".to_string(), series(49_000.0));

        feed.search_results.insert(
            "IE00BK5BQT80".to_string(),
            vec![SymbolCandidate {
                symbol: "VWCE.DE".to_string(),
                name: "Vanguard FTSE All-World UCITS ETF".to_string(),
                exchange: "GER".to_string(),
                quote_type: "ETF".to_string(),
            }],
        );

        feed
    }
}

#[async_trait]
impl MarketDataFeed for MockFeed {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn latest_quote(&self, ticker: &str) -> Result<f64, CoreError> {
        self.latest
            .get(ticker)
            .copied()
            .ok_or_else(|| CoreError::NoData {
                ticker: ticker.into(),
            })
    }

    async fn daily_history(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
    ) -> Result<Vec<PriceSample>, CoreError> {
        Ok(self
            .daily
            .get(ticker)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.timestamp >= start)
            .collect())
    }

    async fn intraday_history(&self, _ticker: &str) -> Result<Vec<PriceSample>, CoreError> {
        Ok(Vec::new())
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolCandidate>, CoreError> {
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }
}

fn ledger() -> Vec<LedgerEntry> {
    vec![
        LedgerEntry {
            executed_at: day(0),
            product: "VANGUARD FTSE AW".to_string(),
            isin: Some("IE00BK5BQT80".to_string()),
            quantity: 10.0,
            cash_amount: -1000.0,
        },
        LedgerEntry {
            executed_at: day(5),
            product: "VANGUARD FTSE AW".to_string(),
            isin: Some("IE00BK5BQT80".to_string()),
            quantity: -4.0,
            cash_amount: 450.0,
        },
        LedgerEntry {
            executed_at: day(2),
            product: "BITCOIN XBTE".to_string(),
            isin: None,
            quantity: 0.01,
            cash_amount: -400.0,
        },
        LedgerEntry {
            executed_at: day(3),
            product: "UNLISTED VENTURES BV".to_string(),
            isin: None,
            quantity: 5.0,
            cash_amount: -500.0,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn ledger_load_aggregates_and_resolution_assigns_tickers() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut lens = LedgerLens::new(store, Arc::new(MockFeed::seeded()));

    lens.load_ledger(ledger());
    assert_eq!(lens.positions().len(), 3);

    let etf = lens.position("IE00BK5BQT80").unwrap();
    assert_eq!(etf.quantity, 6.0);
    assert_eq!(etf.cost_basis, 550.0);
    assert!(etf.ticker.is_none());

    let resolved = lens.resolve_tickers().await;
    assert_eq!(resolved, 2);

    assert_eq!(
        lens.position("IE00BK5BQT80").unwrap().ticker.as_deref(),
        Some("VWCE.DE")
    );
    assert_eq!(
        lens.position("BITCOIN XBTE").unwrap().ticker.as_deref(),
        Some("BTC-EUR")
    );
    // The unlisted instrument stays unresolved and must not break anything.
    assert!(lens.position("UNLISTED VENTURES BV").unwrap().ticker.is_none());
}

#[tokio::test]
async fn resolved_tickers_survive_a_reload_through_the_store() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let feed = Arc::new(MockFeed::seeded());

    {
        let mut lens = LedgerLens::new(Arc::clone(&store), Arc::clone(&feed) as Arc<dyn MarketDataFeed>);
        lens.load_ledger(ledger());
        lens.resolve_tickers().await;
    }

    // A fresh instance over the same store re-attaches tickers at load,
    // before any resolution runs.
    let mut lens = LedgerLens::new(store, feed);
    lens.load_ledger(ledger());
    assert_eq!(
        lens.position("IE00BK5BQT80").unwrap().ticker.as_deref(),
        Some("VWCE.DE")
    );
}

#[tokio::test]
async fn valuation_history_covers_resolved_positions_only() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut lens = LedgerLens::new(store, Arc::new(MockFeed::seeded()));
    lens.load_ledger(ledger());
    lens.resolve_tickers().await;

    let floor = Utc::now() - chrono::Duration::days(40);
    let series = lens.valuation_history("IE00BK5BQT80", floor).await;
    assert!(!series.is_empty());
    // Trades predate the price window, so the full quantity is held
    // throughout and every point is priced.
    for point in &series {
        assert_eq!(point.quantity, 6.0);
        assert_eq!(point.value, 6.0 * point.price);
    }

    let unresolved = lens.valuation_history("UNLISTED VENTURES BV", floor).await;
    assert!(unresolved.is_empty());
}

#[tokio::test]
async fn rebalance_plan_uses_config_targets_and_live_prices() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut lens = LedgerLens::new(Arc::clone(&store), Arc::new(MockFeed::seeded()));
    lens.load_ledger(ledger());
    lens.resolve_tickers().await;

    lens.set_target("IE00BK5BQT80", 70.0).unwrap();
    lens.set_target("BITCOIN XBTE", 30.0).unwrap();

    let plan = lens.rebalance_plan(500.0, true).await;

    // No sells under the no-sell constraint.
    for action in &plan.actions {
        assert_ne!(action.action, Action::Sell);
    }
    // The unpriced position is present but never traded.
    let unlisted = plan
        .actions
        .iter()
        .find(|a| a.key == "UNLISTED VENTURES BV")
        .unwrap();
    assert_eq!(unlisted.action, Action::Hold);

    // Config writes went through the store.
    assert!(store.get("config").is_some());

    // The plan never asks for more cash than the budget allows.
    assert!(plan.net_cash_required <= 500.0 * 1.01);
}

#[tokio::test]
async fn quote_snapshot_degrades_field_by_field() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let lens = LedgerLens::new(store, Arc::new(MockFeed::seeded()));

    let snapshot = lens.quote_snapshot("VWCE.DE").await;
    assert_eq!(snapshot.latest, Some(110.0));
    assert!(snapshot.previous_close.is_some());
    // The mock feed serves no intraday data: the baseline is unknown,
    // not an error.
    assert!(snapshot.session_open.is_none());
}

#[tokio::test]
async fn config_mutators_reject_out_of_range_values() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut lens = LedgerLens::new(store, Arc::new(MockFeed::seeded()));

    assert!(lens.set_target("X", 120.0).is_err());
    assert!(lens.set_target("X", -1.0).is_err());
    assert!(lens.update_planner_settings(Some(-2.0), None).is_err());
    assert!(lens.update_planner_settings(None, Some(f64::NAN)).is_err());

    lens.set_target("X", 40.0).unwrap();
    lens.update_planner_settings(Some(0.5), Some(0.25)).unwrap();
    assert_eq!(lens.config().settings.equity_fee, 0.5);
}

#[tokio::test]
async fn display_names_prefer_config_over_cached_ledger_names() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut lens = LedgerLens::new(store, Arc::new(MockFeed::seeded()));
    lens.load_ledger(ledger());
    lens.resolve_tickers().await;

    // Resolution cached the ledger's product name.
    assert_eq!(lens.display_name("BITCOIN XBTE"), "BITCOIN XBTE");

    lens.set_display_name("BITCOIN XBTE", "Bitcoin").unwrap();
    assert_eq!(lens.display_name("BITCOIN XBTE"), "Bitcoin");
}
