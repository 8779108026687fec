// ═══════════════════════════════════════════════════════════════════
// Model Tests — ledger aggregation, quantity step function, price
// stitching, config persistence
// ═══════════════════════════════════════════════════════════════════

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use ledgerlens_core::models::ledger::{cumulative_quantities, quantity_at, LedgerEntry, QuantityEvent};
use ledgerlens_core::models::position::{aggregate_positions, quantity_events_for};
use ledgerlens_core::models::price::{stitch_price_series, truncate_to_midnight, PriceSample};
use ledgerlens_core::models::settings::TrackerConfig;
use ledgerlens_core::storage::store::{KeyValueStore, MemoryStore};

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(n)
}

fn at(n: i64, hour: u32) -> DateTime<Utc> {
    day(n) + chrono::Duration::hours(hour as i64)
}

fn entry(n: i64, product: &str, isin: Option<&str>, qty: f64, cash: f64) -> LedgerEntry {
    LedgerEntry {
        executed_at: at(n, 10),
        product: product.to_string(),
        isin: isin.map(str::to_string),
        quantity: qty,
        cash_amount: cash,
    }
}

// ── Quantity step function ──────────────────────────────────────────

#[test]
fn cumulative_sum_equals_total_of_deltas() {
    let events = vec![
        QuantityEvent { timestamp: day(0), delta: 10.0 },
        QuantityEvent { timestamp: day(5), delta: -4.0 },
        QuantityEvent { timestamp: day(10), delta: 2.0 },
    ];

    let steps = cumulative_quantities(&events);
    assert_eq!(steps.len(), 3);

    let total: f64 = events.iter().map(|e| e.delta).sum();
    assert_eq!(steps.last().unwrap().1, total);
}

#[test]
fn same_instant_events_collapse_into_one_step() {
    let events = vec![
        QuantityEvent { timestamp: at(0, 10), delta: 3.0 },
        QuantityEvent { timestamp: at(0, 10), delta: 2.0 },
        QuantityEvent { timestamp: at(1, 10), delta: 1.0 },
    ];

    let steps = cumulative_quantities(&events);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].1, 5.0);
    assert_eq!(steps[1].1, 6.0);
}

#[test]
fn oversell_is_a_pure_running_sum() {
    let events = vec![
        QuantityEvent { timestamp: day(0), delta: 2.0 },
        QuantityEvent { timestamp: day(1), delta: -5.0 },
    ];

    let steps = cumulative_quantities(&events);
    assert_eq!(steps[1].1, -3.0);
}

#[test]
fn quantity_forward_fills_between_steps_and_is_zero_before_first() {
    let steps = cumulative_quantities(&[
        QuantityEvent { timestamp: day(2), delta: 10.0 },
        QuantityEvent { timestamp: day(6), delta: -4.0 },
    ]);

    assert_eq!(quantity_at(&steps, day(0)), 0.0);
    assert_eq!(quantity_at(&steps, day(2)), 10.0);
    assert_eq!(quantity_at(&steps, day(4)), 10.0);
    assert_eq!(quantity_at(&steps, day(6)), 6.0);
    assert_eq!(quantity_at(&steps, day(9)), 6.0);
}

// ── Position aggregation ────────────────────────────────────────────

#[test]
fn positions_aggregate_quantity_and_cost_basis() {
    let entries = vec![
        entry(0, "ACME CORP", Some("US0000000001"), 10.0, -1000.0),
        entry(5, "ACME CORP", Some("US0000000001"), -4.0, 450.0),
        entry(1, "GLOBEX FUND", None, 3.0, -300.0),
    ];

    let positions = aggregate_positions(&entries);
    assert_eq!(positions.len(), 2);

    let acme = positions.iter().find(|p| p.key == "US0000000001").unwrap();
    assert_eq!(acme.quantity, 6.0);
    // 1000 spent minus 450 recovered
    assert_eq!(acme.cost_basis, 550.0);
    assert_eq!(acme.name, "ACME CORP");
    assert!(acme.ticker.is_none());

    let globex = positions.iter().find(|p| p.key == "GLOBEX FUND").unwrap();
    assert_eq!(globex.quantity, 3.0);
    assert_eq!(globex.cost_basis, 300.0);
}

#[test]
fn dividends_reduce_cost_basis_without_touching_quantity() {
    let entries = vec![
        entry(0, "ACME CORP", Some("US0000000001"), 10.0, -1000.0),
        // Dividend row: cash in, no quantity change
        entry(30, "ACME CORP", Some("US0000000001"), 0.0, 25.0),
    ];

    let positions = aggregate_positions(&entries);
    assert_eq!(positions[0].quantity, 10.0);
    assert_eq!(positions[0].cost_basis, 975.0);
}

#[test]
fn quantity_events_are_filtered_per_key_and_ordered() {
    let entries = vec![
        entry(5, "ACME CORP", Some("US0000000001"), -4.0, 450.0),
        entry(0, "ACME CORP", Some("US0000000001"), 10.0, -1000.0),
        entry(1, "GLOBEX FUND", None, 3.0, -300.0),
    ];

    let events = quantity_events_for(&entries, "US0000000001");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].delta, 10.0);
    assert_eq!(events[1].delta, -4.0);
}

// ── Price stitching ─────────────────────────────────────────────────

#[test]
fn stitch_never_produces_duplicate_timestamps() {
    let daily = vec![
        PriceSample { timestamp: day(0), price: 100.0 },
        PriceSample { timestamp: day(1), price: 101.0 },
        PriceSample { timestamp: day(2), price: 102.0 },
    ];
    let intraday = vec![
        PriceSample { timestamp: at(1, 9), price: 101.5 },
        PriceSample { timestamp: at(2, 9), price: 102.5 },
    ];

    let stitched = stitch_price_series(daily, intraday);
    for pair in stitched.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp);
    }
}

#[test]
fn stitch_keeps_intraday_sample_on_timestamp_overlap() {
    let overlap = at(1, 9);
    let daily = vec![
        PriceSample { timestamp: day(0), price: 100.0 },
        PriceSample { timestamp: overlap, price: 999.0 },
    ];
    let intraday = vec![PriceSample { timestamp: overlap, price: 101.5 }];

    let stitched = stitch_price_series(daily, intraday);
    assert_eq!(stitched.len(), 2);
    let at_overlap = stitched.iter().find(|s| s.timestamp == overlap).unwrap();
    assert_eq!(at_overlap.price, 101.5);
}

#[test]
fn stitch_drops_daily_samples_inside_the_intraday_window() {
    let daily = vec![
        PriceSample { timestamp: day(0), price: 100.0 },
        PriceSample { timestamp: day(1), price: 101.0 },
        // Inside the intraday window: a stale midnight close
        PriceSample { timestamp: day(3), price: 103.0 },
    ];
    let intraday = vec![
        PriceSample { timestamp: at(2, 9), price: 102.4 },
        PriceSample { timestamp: at(3, 9), price: 103.4 },
    ];

    let stitched = stitch_price_series(daily, intraday);
    let timestamps: Vec<_> = stitched.iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, vec![day(0), day(1), at(2, 9), at(3, 9)]);
}

#[test]
fn stitch_with_one_empty_side_returns_the_other() {
    let daily = vec![PriceSample { timestamp: day(0), price: 100.0 }];

    let only_daily = stitch_price_series(daily.clone(), Vec::new());
    assert_eq!(only_daily, daily);

    let intraday = vec![PriceSample { timestamp: at(0, 9), price: 100.5 }];
    let only_intraday = stitch_price_series(Vec::new(), intraday.clone());
    assert_eq!(only_intraday, intraday);
}

#[test]
fn truncation_pins_timestamps_to_midnight() {
    let truncated = truncate_to_midnight(at(3, 17));
    assert_eq!(truncated, day(3));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn config_defaults_carry_standard_fees() {
    let config = TrackerConfig::default();
    assert_eq!(config.settings.equity_fee, 1.0);
    assert_eq!(config.settings.crypto_fee_pct, 0.29);
    assert!(config.assets.is_empty());
}

#[test]
fn config_roundtrips_through_the_store() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let mut config = TrackerConfig::default();
    config.set_target("US0000000001", 60.0);
    config.set_target("GLOBEX FUND", 40.0);
    config.set_display_name("US0000000001", "Acme");
    config.settings.equity_fee = 2.5;
    config.save(&store).unwrap();

    let reloaded = TrackerConfig::load(&store);
    assert_eq!(reloaded.assets.len(), 2);
    assert_eq!(reloaded.assets["US0000000001"].target_pct, 60.0);
    assert_eq!(reloaded.display_name("US0000000001"), "Acme");
    assert_eq!(reloaded.display_name("GLOBEX FUND"), "GLOBEX FUND");
    assert_eq!(reloaded.settings.equity_fee, 2.5);
}

#[test]
fn config_load_from_empty_store_yields_defaults() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let config = TrackerConfig::load(&store);
    assert!(config.assets.is_empty());
    assert_eq!(config.settings.crypto_fee_pct, 0.29);
}
