use std::collections::{BTreeMap, BTreeSet};

use crate::models::rebalance::{Action, PositionSnapshot, RebalanceAction, RebalancePlan};
use crate::models::settings::PlannerSettings;

/// Target percentages may drift from 100 by this much before the plan is
/// annotated with a warning. Planning proceeds either way.
const TARGET_SUM_TOLERANCE: f64 = 0.5;

/// Trades whose executed value would fall below this are not worth their
/// fee and collapse to Hold.
const MIN_ACTION_VALUE: f64 = 1.0;

/// The corrected net cash requirement may exceed the budget by this
/// relative margin before share trimming kicks in.
const BUDGET_FIT_REL_TOL: f64 = 0.01;

/// Working state per key while the plan is being shaped.
struct Draft {
    key: String,
    action: Action,
    delta_value: f64,
    shares: f64,
    fee: f64,
    price: Option<f64>,
    is_crypto: bool,
}

impl Draft {
    fn hold(key: String, price: Option<f64>, is_crypto: bool) -> Self {
        Self {
            key,
            action: Action::Hold,
            delta_value: 0.0,
            shares: 0.0,
            fee: 0.0,
            price,
            is_crypto,
        }
    }
}

/// Turns current values plus target percentages into a discrete trade
/// plan: whole shares for equities, fractional for crypto, fees on every
/// executed trade, and a correction loop that keeps the plan's net cash
/// requirement inside the stated budget.
pub struct RebalanceService;

impl RebalanceService {
    pub fn new() -> Self {
        Self
    }

    /// Build a plan. Never fails: infeasible targets or an insufficient
    /// budget degrade to warnings on the returned plan, and a key without
    /// a price is never traded.
    pub fn plan(
        &self,
        positions: &BTreeMap<String, PositionSnapshot>,
        targets: &BTreeMap<String, f64>,
        budget: f64,
        prevent_sell: bool,
        settings: &PlannerSettings,
    ) -> RebalancePlan {
        let mut warnings = Vec::new();

        let target_sum: f64 = targets.values().sum();
        if (target_sum - 100.0).abs() > TARGET_SUM_TOLERANCE {
            warnings.push(format!(
                "target percentages sum to {target_sum:.2} instead of 100; plan uses them as given"
            ));
        }

        let current_total: f64 = positions.values().map(|p| p.value).sum();
        let new_total = current_total + budget;

        // Gap per key over the union of held and targeted instruments.
        let keys: BTreeSet<&String> = positions.keys().chain(targets.keys()).collect();
        let mut gaps: Vec<(String, f64)> = keys
            .into_iter()
            .map(|key| {
                let target_pct = targets.get(key).copied().unwrap_or(0.0);
                let current = positions.get(key).map(|p| p.value).unwrap_or(0.0);
                (key.clone(), new_total * target_pct / 100.0 - current)
            })
            .collect();

        if prevent_sell {
            let positive_total: f64 = gaps.iter().map(|(_, g)| g.max(0.0)).sum();
            for (_, gap) in gaps.iter_mut().filter(|(_, g)| *g < 0.0) {
                *gap = 0.0;
            }
            if positive_total > budget && positive_total > 0.0 {
                let scale = budget.max(0.0) / positive_total;
                for (_, gap) in gaps.iter_mut() {
                    *gap *= scale;
                }
                warnings.push(format!(
                    "no-sell constraint: buy gaps scaled by {scale:.4} to stay within the budget"
                ));
            }
        }

        let mut drafts: Vec<Draft> = gaps
            .into_iter()
            .map(|(key, gap)| draft_trade(key, gap, positions, settings))
            .collect();

        self.fit_to_budget(&mut drafts, budget, settings, &mut warnings);

        // Post-trade percentages against the realized total. Informational
        // only — nothing below feeds back into the trades.
        let realized_total: f64 =
            current_total + drafts.iter().map(|d| d.delta_value).sum::<f64>();
        let actions = drafts
            .into_iter()
            .map(|d| {
                let current = positions.get(&d.key).map(|p| p.value).unwrap_or(0.0);
                let resulting_pct = if realized_total > 0.0 {
                    (current + d.delta_value) / realized_total * 100.0
                } else {
                    0.0
                };
                RebalanceAction {
                    key: d.key,
                    action: d.action,
                    delta_value: d.delta_value,
                    shares: d.shares,
                    fee: d.fee,
                    resulting_pct,
                }
            })
            .collect::<Vec<_>>();

        let net_cash_required = net_cash(
            actions
                .iter()
                .map(|a| (a.action, a.delta_value, a.fee)),
        );
        let total_fees = actions
            .iter()
            .filter(|a| a.action != Action::Hold)
            .map(|a| a.fee)
            .sum();

        RebalancePlan {
            actions,
            warnings,
            net_cash_required,
            total_fees,
        }
    }

    /// Greedy budget-fit: while the plan's net cash requirement exceeds
    /// the budget beyond tolerance, shave one share off the
    /// highest-priced whole-share buy. High-priced instruments move the
    /// total fastest, so this converges in the fewest passes.
    fn fit_to_budget(
        &self,
        drafts: &mut [Draft],
        budget: f64,
        settings: &PlannerSettings,
        warnings: &mut Vec<String>,
    ) {
        let tolerance = budget.abs() * BUDGET_FIT_REL_TOL;
        let mut trimmed_shares = 0u32;

        loop {
            let net = net_cash(drafts.iter().map(|d| (d.action, d.delta_value, d.fee)));
            if net <= budget + tolerance {
                break;
            }

            let candidate = drafts
                .iter_mut()
                .filter(|d| d.action == Action::Buy && !d.is_crypto && d.shares >= 1.0)
                .max_by(|a, b| {
                    let pa = a.price.unwrap_or(0.0);
                    let pb = b.price.unwrap_or(0.0);
                    pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
                });

            let Some(draft) = candidate else {
                warnings.push(format!(
                    "net cash requirement {net:.2} exceeds budget {budget:.2} and no whole-share buy is left to reduce"
                ));
                break;
            };

            draft.shares -= 1.0;
            trimmed_shares += 1;
            if draft.shares < 1.0 {
                draft.shares = 0.0;
                draft.action = Action::Hold;
                draft.delta_value = 0.0;
                draft.fee = 0.0;
            } else {
                let price = draft.price.unwrap_or(0.0);
                draft.delta_value = draft.shares * price;
                draft.fee = settings.equity_fee;
            }
        }

        if trimmed_shares > 0 {
            warnings.push(format!(
                "trimmed {trimmed_shares} share(s) from buy orders to fit the budget"
            ));
        }
    }
}

impl Default for RebalanceService {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert one key's value gap into a concrete trade.
fn draft_trade(
    key: String,
    gap: f64,
    positions: &BTreeMap<String, PositionSnapshot>,
    settings: &PlannerSettings,
) -> Draft {
    let snapshot = positions.get(&key);
    let is_crypto = snapshot.map(|s| s.is_crypto).unwrap_or(false);
    let price = snapshot.and_then(|s| s.price);

    // An instrument the feed cannot price is never traded, whatever the
    // target says.
    let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
        return Draft::hold(key, None, is_crypto);
    };

    if gap.abs() < MIN_ACTION_VALUE {
        return Draft::hold(key, Some(price), is_crypto);
    }

    let (delta_value, shares) = if is_crypto {
        // Crypto trades fractionally: the executed value is the gap itself.
        (gap, (gap / price).abs())
    } else {
        // Hard whole-share constraint for everything else.
        let shares = (gap / price).round();
        (shares * price, shares.abs())
    };

    if shares == 0.0 || delta_value.abs() < MIN_ACTION_VALUE {
        return Draft::hold(key, Some(price), is_crypto);
    }

    let action = if delta_value > 0.0 {
        Action::Buy
    } else {
        Action::Sell
    };
    let fee = if is_crypto {
        delta_value.abs() * settings.crypto_fee_pct / 100.0
    } else {
        settings.equity_fee
    };

    Draft {
        key,
        action,
        delta_value,
        shares,
        fee,
        price: Some(price),
        is_crypto,
    }
}

/// `total buys incl. fees − max(0, total sells after fees)`.
fn net_cash(actions: impl Iterator<Item = (Action, f64, f64)>) -> f64 {
    let mut buys = 0.0;
    let mut sells_after_fees = 0.0;
    for (action, delta_value, fee) in actions {
        match action {
            Action::Buy => buys += delta_value + fee,
            Action::Sell => sells_after_fees += -delta_value - fee,
            Action::Hold => {}
        }
    }
    buys - sells_after_fees.max(0.0)
}
