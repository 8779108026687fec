use serde::{Deserialize, Serialize};

/// Trade direction of a planned rebalancing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    /// Nothing to do: already on target, below the minimum trade size,
    /// or the instrument cannot be priced.
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// One planned trade. Created per planning run, fully determined by the
/// inputs, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceAction {
    /// Instrument key (ISIN or product name).
    pub key: String,

    pub action: Action,

    /// Signed executed value: positive for buys, negative for sells,
    /// zero for holds. For whole-share instruments this is the rounded
    /// `shares * price`, not the raw gap.
    pub delta_value: f64,

    /// Share count to trade. Fractional for crypto, whole otherwise.
    pub shares: f64,

    /// Fee for this trade: flat for equities, percentage for crypto.
    pub fee: f64,

    /// Allocation percentage this position would end at once every
    /// planned trade executed. Informational only.
    pub resulting_pct: f64,
}

/// A complete rebalancing plan plus its cash-flow summary.
///
/// Infeasible inputs (targets that do not sum to 100, a budget too small
/// for the no-sell constraint) degrade to warnings — the plan always
/// carries best-effort numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub actions: Vec<RebalanceAction>,

    /// Human-readable annotations: tolerance violations, applied
    /// scaling, budget-fit outcome.
    pub warnings: Vec<String>,

    /// `total buys incl. fees − max(0, total sells after fees)`.
    pub net_cash_required: f64,

    pub total_fees: f64,
}

impl RebalancePlan {
    /// Actions that actually move money, in planning order.
    pub fn trades(&self) -> impl Iterator<Item = &RebalanceAction> {
        self.actions.iter().filter(|a| a.action != Action::Hold)
    }
}

/// Current state of one position as the planner sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSnapshot {
    /// Current market value.
    pub value: f64,

    /// Live price per share; `None` when the ticker is unresolved or the
    /// feed has no quote. Unpriced instruments are never traded.
    pub price: Option<f64>,

    /// Crypto positions trade fractionally and pay a percentage fee.
    pub is_crypto: bool,
}
