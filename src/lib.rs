//! Inventory-aware market making engine fed by the Bybit public websocket stream.
//!
//! [`market_maker`] holds the statistics, control and optimisation core; [`ws_client`]
//! and [`types`] connect it to the exchange.

pub mod errors;
pub mod market_maker;
pub mod types;
pub mod ws_client;

pub use errors::{FeedError, FeedResult, QuoteInputError};
pub use market_maker::{
    MarketMakerConfig, MarketState, Orchestrator, Quote, QuoteStatus, SpreadOptimizer,
};
pub use types::{decode_message, parse_decimal, FeedEvent, Topics};
pub use ws_client::{
    apply_event, run_feed, BybitSession, ExponentialBackoff, FeedConfig, FeedSession,
    SessionError,
};
