//! Inventory-aware market making for a single pair.
//!
//! The feed task writes into [`MarketState`] (which owns the trade window and drives the
//! [`EmaController`] factor); the [`Orchestrator`] reads it, asks the
//! [`SpreadOptimizer`] for a quote, applies the simulated fill to the [`Inventory`] and
//! sleeps for the cadence the EMA picks.

pub mod config;
pub mod ema;
pub mod inventory;
pub mod lp;
pub mod market_state;
pub mod orchestrator;
pub mod spreads;
pub mod types;
pub mod volatility;

pub use config::MarketMakerConfig;
pub use ema::{EmaController, EmaParams, SharedEma};
pub use inventory::Inventory;
pub use lp::{BoundedLp, LinearConstraint, LpSolution, LpSolver, SolveStatus, VertexSolver};
pub use market_state::{MarketState, MarketStateParams};
pub use orchestrator::Orchestrator;
pub use spreads::{OptimizerParams, SpreadOptimizer, SpreadWeights};
pub use types::{
    BookLevel, CycleReport, FillOutcome, FillSide, LoopState, MarketSnapshot, Quote,
    QuoteDiagnostics, QuoteStatus, Readiness,
};
pub use volatility::{population_std_dev, TradeWindow};
