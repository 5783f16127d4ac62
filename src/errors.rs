use thiserror::Error;

pub type FeedResult<T> = std::result::Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unsupported websocket scheme {0}")]
    UnsupportedScheme(String),
    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),
    #[error("connection closed by server{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
    #[error("no message received for {0:?}")]
    Stalled(std::time::Duration),
    #[error("max reconnection attempts ({0}) exceeded")]
    ReconnectExhausted(u32),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Reasons the optimiser refuses its inputs and falls back to the symmetric quote.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum QuoteInputError {
    #[error("current price should be greater than 0 (got {0})")]
    NonPositivePrice(f64),
    #[error("max inventory should be greater than 0 (got {0})")]
    NonPositiveInventory(f64),
    #[error("volatility should not be negative (got {0})")]
    NegativeVolatility(f64),
    #[error("liquidity should be greater than 0 (got {0})")]
    NonPositiveLiquidity(f64),
    #[error("order book depth should not be negative (got {0})")]
    NegativeDepth(f64),
}
