use super::lp::SolveStatus;
use serde::Serialize;

/// One parsed order-book level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Statistics read by the optimisation loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub mid_price: f64,
    pub volatility: f64,
    pub liquidity: f64,
    pub order_book_depth: f64,
}

/// Per-channel readiness flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub order_book: bool,
    pub trade: bool,
    pub ticker: bool,
}

impl Readiness {
    pub fn all(&self) -> bool {
        self.order_book && self.trade && self.ticker
    }
}

/// Outcome attached to every quote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum QuoteStatus {
    Optimal,
    Infeasible,
    Unbounded,
    /// Inputs failed validation; no optimisation was attempted.
    Neutral,
}

impl QuoteStatus {
    /// True when the quote carries the symmetric fallback prices.
    pub fn is_fallback(self) -> bool {
        !matches!(self, QuoteStatus::Optimal)
    }
}

impl From<SolveStatus> for QuoteStatus {
    fn from(status: SolveStatus) -> Self {
        match status {
            SolveStatus::Optimal => QuoteStatus::Optimal,
            SolveStatus::Infeasible => QuoteStatus::Infeasible,
            SolveStatus::Unbounded => QuoteStatus::Unbounded,
        }
    }
}

/// Bid/ask pair produced by one optimisation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub status: QuoteStatus,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Intermediate values of a solved quote, kept for logging.
#[derive(Clone, Debug, Default, Serialize)]
pub struct QuoteDiagnostics {
    pub total_value: f64,
    pub asset_ratio: f64,
    pub volatility_penalty: f64,
    pub liquidity_penalty: f64,
    pub depth_penalty: f64,
    pub objective: [f64; 2],
    pub bid_bounds: [f64; 2],
    pub ask_bounds: [f64; 2],
    pub min_spread: f64,
}

/// Result of applying the fill rule to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum FillOutcome {
    Bought { quantity: f64, price: f64 },
    Sold { quantity: f64, price: f64 },
    NoFill,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FillSide {
    Buy,
    Sell,
}

/// Orchestrator state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoopState {
    WaitingReady,
    Cycling,
}

/// Everything one optimisation cycle observed and decided.
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub snapshot: MarketSnapshot,
    pub quote: Quote,
    pub fill: FillOutcome,
    pub cash_balance: f64,
    pub crypto_balance: f64,
    pub ema_volatility: f64,
    pub next_cadence_minutes: u64,
}
