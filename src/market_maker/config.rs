use super::{
    ema::EmaParams,
    inventory::Inventory,
    market_state::MarketStateParams,
    spreads::{OptimizerParams, SpreadWeights},
};
use crate::ws_client::{ExponentialBackoff, FeedConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};

const ENV_PREFIX: &str = "INVENTORY_MM_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketMakerConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_order_book_levels")]
    pub order_book_levels: u32,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default = "default_initial_crypto")]
    pub initial_crypto: f64,
    #[serde(default = "default_trading_fee_rate")]
    pub trading_fee_rate: f64,
    #[serde(default = "default_trade_window")]
    pub trade_window: usize,
    #[serde(default = "default_liquidity_range")]
    pub liquidity_range: f64,
    #[serde(default = "default_depth_range")]
    pub depth_range: f64,
    #[serde(default = "default_readiness_poll_secs")]
    pub readiness_poll_secs: u64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_one")]
    pub beta: f64,
    #[serde(default = "default_one")]
    pub gamma: f64,
    #[serde(default)]
    pub inventory_skew: f64,
    #[serde(default = "default_fraction")]
    pub deviation_fraction: f64,
    #[serde(default = "default_fraction")]
    pub min_spread_fraction: f64,
    #[serde(default = "default_spread")]
    pub default_spread: f64,
    #[serde(default = "default_ema_min_factor")]
    pub ema_min_factor: f64,
    #[serde(default = "default_ema_max_factor")]
    pub ema_max_factor: f64,
    #[serde(default = "default_ema_low_threshold")]
    pub ema_low_threshold: f64,
    #[serde(default = "default_ema_high_threshold")]
    pub ema_high_threshold: f64,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_backoff_reset_secs")]
    pub backoff_reset_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_ws_url() -> String {
    "wss://stream.bybit.com/v5/public/linear".to_string()
}

fn default_order_book_levels() -> u32 {
    50
}

fn default_initial_cash() -> f64 {
    1000.0
}

fn default_initial_crypto() -> f64 {
    0.12345
}

fn default_trading_fee_rate() -> f64 {
    0.02
}

fn default_trade_window() -> usize {
    50
}

fn default_liquidity_range() -> f64 {
    0.01
}

fn default_depth_range() -> f64 {
    0.05
}

fn default_readiness_poll_secs() -> u64 {
    5
}

fn default_alpha() -> f64 {
    0.05
}

fn default_one() -> f64 {
    1.0
}

fn default_fraction() -> f64 {
    0.01
}

fn default_spread() -> f64 {
    0.5
}

fn default_ema_min_factor() -> f64 {
    0.05
}

fn default_ema_max_factor() -> f64 {
    0.5
}

fn default_ema_low_threshold() -> f64 {
    0.5
}

fn default_ema_high_threshold() -> f64 {
    2.0
}

fn default_initial_backoff_secs() -> u64 {
    5
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_secs() -> u64 {
    600
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_backoff_reset_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    20
}

fn default_read_timeout_secs() -> u64 {
    30
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            ws_url: default_ws_url(),
            order_book_levels: default_order_book_levels(),
            initial_cash: default_initial_cash(),
            initial_crypto: default_initial_crypto(),
            trading_fee_rate: default_trading_fee_rate(),
            trade_window: default_trade_window(),
            liquidity_range: default_liquidity_range(),
            depth_range: default_depth_range(),
            readiness_poll_secs: default_readiness_poll_secs(),
            alpha: default_alpha(),
            beta: default_one(),
            gamma: default_one(),
            inventory_skew: 0.0,
            deviation_fraction: default_fraction(),
            min_spread_fraction: default_fraction(),
            default_spread: default_spread(),
            ema_min_factor: default_ema_min_factor(),
            ema_max_factor: default_ema_max_factor(),
            ema_low_threshold: default_ema_low_threshold(),
            ema_high_threshold: default_ema_high_threshold(),
            initial_backoff_secs: default_initial_backoff_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_secs: default_max_backoff_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_reset_secs: default_backoff_reset_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl MarketMakerConfig {
    /// Reads a TOML file, applies `INVENTORY_MM_*` env overrides and validates.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut cfg = Self::parse(&data)?;
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus env overrides, for running without a config file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses either a `[market_maker]` table or top-level entries.
    pub fn parse(data: &str) -> Result<Self> {
        let raw: toml::Value = toml::from_str(data).context("Failed to parse TOML config")?;
        let nested = raw
            .get("market_maker")
            .filter(|value| value.is_table())
            .cloned();
        nested
            .unwrap_or(raw)
            .try_into()
            .context("Invalid market_maker config structure")
    }

    /// Overrides each field from `INVENTORY_MM_<FIELD>` as returned by `lookup`.
    /// Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = get("SYMBOL") {
            self.symbol = value;
        }
        if let Some(value) = get("WS_URL") {
            self.ws_url = value;
        }
        override_parsed(get("ORDER_BOOK_LEVELS"), &mut self.order_book_levels);
        override_parsed(get("INITIAL_CASH"), &mut self.initial_cash);
        override_parsed(get("INITIAL_CRYPTO"), &mut self.initial_crypto);
        override_parsed(get("TRADING_FEE_RATE"), &mut self.trading_fee_rate);
        override_parsed(get("TRADE_WINDOW"), &mut self.trade_window);
        override_parsed(get("LIQUIDITY_RANGE"), &mut self.liquidity_range);
        override_parsed(get("DEPTH_RANGE"), &mut self.depth_range);
        override_parsed(get("READINESS_POLL_SECS"), &mut self.readiness_poll_secs);
        override_parsed(get("ALPHA"), &mut self.alpha);
        override_parsed(get("BETA"), &mut self.beta);
        override_parsed(get("GAMMA"), &mut self.gamma);
        override_parsed(get("INVENTORY_SKEW"), &mut self.inventory_skew);
        override_parsed(get("DEVIATION_FRACTION"), &mut self.deviation_fraction);
        override_parsed(get("MIN_SPREAD_FRACTION"), &mut self.min_spread_fraction);
        override_parsed(get("DEFAULT_SPREAD"), &mut self.default_spread);
        override_parsed(get("EMA_MIN_FACTOR"), &mut self.ema_min_factor);
        override_parsed(get("EMA_MAX_FACTOR"), &mut self.ema_max_factor);
        override_parsed(get("EMA_LOW_THRESHOLD"), &mut self.ema_low_threshold);
        override_parsed(get("EMA_HIGH_THRESHOLD"), &mut self.ema_high_threshold);
        override_parsed(get("INITIAL_BACKOFF_SECS"), &mut self.initial_backoff_secs);
        override_parsed(get("BACKOFF_MULTIPLIER"), &mut self.backoff_multiplier);
        override_parsed(get("MAX_BACKOFF_SECS"), &mut self.max_backoff_secs);
        override_parsed(
            get("MAX_RECONNECT_ATTEMPTS"),
            &mut self.max_reconnect_attempts,
        );
        override_parsed(get("BACKOFF_RESET_SECS"), &mut self.backoff_reset_secs);
        override_parsed(get("PING_INTERVAL_SECS"), &mut self.ping_interval_secs);
        override_parsed(get("READ_TIMEOUT_SECS"), &mut self.read_timeout_secs);
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.symbol.is_empty(), "symbol must not be empty");
        anyhow::ensure!(
            (0.0..1.0).contains(&self.trading_fee_rate),
            "trading_fee_rate must be within [0, 1)"
        );
        anyhow::ensure!(
            self.initial_cash >= 0.0 && self.initial_crypto >= 0.0,
            "initial balances must be non-negative"
        );
        anyhow::ensure!(self.trade_window >= 2, "trade_window must be at least 2");
        for (name, value) in [
            ("liquidity_range", self.liquidity_range),
            ("depth_range", self.depth_range),
            ("deviation_fraction", self.deviation_fraction),
            ("min_spread_fraction", self.min_spread_fraction),
        ] {
            anyhow::ensure!(
                value > 0.0 && value < 1.0,
                "{name} must be within (0, 1)"
            );
        }
        anyhow::ensure!(
            self.alpha >= 0.0 && self.beta >= 0.0 && self.gamma >= 0.0,
            "alpha, beta and gamma must be non-negative"
        );
        anyhow::ensure!(
            self.inventory_skew.is_finite(),
            "inventory_skew must be finite"
        );
        anyhow::ensure!(
            self.default_spread > 0.0,
            "default_spread must be greater than zero"
        );
        anyhow::ensure!(
            self.ema_min_factor > 0.0
                && self.ema_max_factor <= 1.0
                && self.ema_min_factor <= self.ema_max_factor,
            "ema factors must satisfy 0 < min <= max <= 1"
        );
        anyhow::ensure!(
            self.ema_low_threshold < self.ema_high_threshold,
            "ema_low_threshold must be below ema_high_threshold"
        );
        anyhow::ensure!(
            self.readiness_poll_secs > 0,
            "readiness_poll_secs must be greater than zero"
        );
        anyhow::ensure!(
            self.backoff_multiplier >= 1.0,
            "backoff_multiplier must be at least 1"
        );
        anyhow::ensure!(
            self.max_backoff_secs >= self.initial_backoff_secs,
            "max_backoff_secs must be >= initial_backoff_secs"
        );
        anyhow::ensure!(
            self.max_reconnect_attempts >= 1,
            "max_reconnect_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.ping_interval_secs > 0 && self.read_timeout_secs > 0,
            "ping_interval_secs and read_timeout_secs must be greater than zero"
        );
        Ok(())
    }

    pub fn market_state_params(&self) -> MarketStateParams {
        MarketStateParams {
            trade_window: self.trade_window,
            liquidity_range: self.liquidity_range,
            depth_range: self.depth_range,
        }
    }

    pub fn ema_params(&self) -> EmaParams {
        EmaParams {
            min_factor: self.ema_min_factor,
            max_factor: self.ema_max_factor,
            low_threshold: self.ema_low_threshold,
            high_threshold: self.ema_high_threshold,
        }
    }

    pub fn optimizer_params(&self) -> OptimizerParams {
        OptimizerParams {
            weights: SpreadWeights {
                alpha: self.alpha,
                beta: self.beta,
                gamma: self.gamma,
                inventory_skew: self.inventory_skew,
            },
            deviation_fraction: self.deviation_fraction,
            min_spread_fraction: self.min_spread_fraction,
            default_spread: self.default_spread,
        }
    }

    pub fn inventory(&self) -> Inventory {
        Inventory::new(self.initial_cash, self.initial_crypto, self.trading_fee_rate)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_poll_secs)
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial: Duration::from_secs(self.initial_backoff_secs),
            max: Duration::from_secs(self.max_backoff_secs),
            multiplier: self.backoff_multiplier,
            max_attempts: self.max_reconnect_attempts,
            reset_after: Duration::from_secs(self.backoff_reset_secs),
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            url: self.ws_url.clone(),
            symbol: self.symbol.clone(),
            order_book_levels: self.order_book_levels,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(value: Option<String>, field: &mut T) {
    if let Some(parsed) = value.and_then(|v| v.trim().parse::<T>().ok()) {
        *field = parsed;
    }
}
