use super::{
    ema::SharedEma,
    types::{BookLevel, MarketSnapshot, Readiness},
    volatility::{TradeWindow, TRADE_WINDOW_LEN},
};
use parking_lot::Mutex;

/// Band around mid used for the liquidity sum.
pub const LIQUIDITY_RANGE: f64 = 0.01;
/// Band around mid used for the level count.
pub const DEPTH_RANGE: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketStateParams {
    pub trade_window: usize,
    pub liquidity_range: f64,
    pub depth_range: f64,
}

impl Default for MarketStateParams {
    fn default() -> Self {
        Self {
            trade_window: TRADE_WINDOW_LEN,
            liquidity_range: LIQUIDITY_RANGE,
            depth_range: DEPTH_RANGE,
        }
    }
}

#[derive(Debug)]
struct StatsInner {
    trades: TradeWindow,
    mid_price: f64,
    volatility: f64,
    liquidity: f64,
    order_book_depth: f64,
    order_book_ready: bool,
    trade_ready: bool,
    ticker_ready: bool,
}

/// Rolling market statistics fed by the exchange stream and read by the optimisation
/// loop.
///
/// Every update holds the lock for its whole duration, and every accessor takes it
/// once. Reading several fields through separate accessors is therefore not
/// transactional: [`MarketState::snapshot`] may combine values from different update
/// cycles.
#[derive(Debug)]
pub struct MarketState {
    params: MarketStateParams,
    inner: Mutex<StatsInner>,
    ema: SharedEma,
}

impl MarketState {
    pub fn new(params: MarketStateParams, ema: SharedEma) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                trades: TradeWindow::new(params.trade_window),
                mid_price: 0.0,
                volatility: 0.0,
                liquidity: 0.0,
                order_book_depth: 0.0,
                order_book_ready: false,
                trade_ready: false,
                ticker_ready: false,
            }),
            params,
            ema,
        }
    }

    pub fn update_ticker(&self, bid1: f64, ask1: f64) {
        let mut inner = self.inner.lock();
        inner.mid_price = (bid1 + ask1) / 2.0;
        inner.ticker_ready = true;
    }

    /// Pushes a trade price, refreshes volatility and re-derives the EMA factor.
    pub fn update_trade(&self, price: f64) {
        let mut inner = self.inner.lock();
        let volatility = inner.trades.push(price);
        inner.volatility = volatility;
        // Lock order: stats before EMA.
        self.ema.lock().adjust_factor(volatility);
        inner.trade_ready = true;
    }

    /// Recomputes liquidity and depth against the mid price currently held, which may
    /// predate the book being processed since channels are not synchronised.
    ///
    /// Order-book readiness is only raised once the trade window is full.
    pub fn update_orderbook(&self, bids: &[BookLevel], asks: &[BookLevel]) {
        let mut inner = self.inner.lock();
        let mid = inner.mid_price;
        let liquidity_range = self.params.liquidity_range;
        let depth_range = self.params.depth_range;

        let mut liquidity_bid = 0.0;
        let mut depth_bid = 0usize;
        for level in bids {
            if level.price >= mid * (1.0 - liquidity_range) {
                liquidity_bid += level.quantity;
            }
            if level.price >= mid * (1.0 - depth_range) {
                depth_bid += 1;
            }
        }

        let mut liquidity_ask = 0.0;
        let mut depth_ask = 0usize;
        for level in asks {
            if level.price <= mid * (1.0 + liquidity_range) {
                liquidity_ask += level.quantity;
            }
            if level.price <= mid * (1.0 + depth_range) {
                depth_ask += 1;
            }
        }

        inner.liquidity = (liquidity_bid + liquidity_ask) / 2.0;
        inner.order_book_depth = (depth_bid + depth_ask) as f64 / 2.0;

        if inner.trades.len() >= self.params.trade_window {
            inner.order_book_ready = true;
        }
    }

    pub fn mid_price(&self) -> f64 {
        self.inner.lock().mid_price
    }

    pub fn volatility(&self) -> f64 {
        self.inner.lock().volatility
    }

    pub fn liquidity(&self) -> f64 {
        self.inner.lock().liquidity
    }

    pub fn order_book_depth(&self) -> f64 {
        self.inner.lock().order_book_depth
    }

    pub fn trade_count(&self) -> usize {
        self.inner.lock().trades.len()
    }

    /// Assembled from the individual accessors; see the type-level note on consistency.
    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            mid_price: self.mid_price(),
            volatility: self.volatility(),
            liquidity: self.liquidity(),
            order_book_depth: self.order_book_depth(),
        }
    }

    pub fn readiness(&self) -> Readiness {
        let inner = self.inner.lock();
        Readiness {
            order_book: inner.order_book_ready,
            trade: inner.trade_ready,
            ticker: inner.ticker_ready,
        }
    }

    pub fn ema(&self) -> &SharedEma {
        &self.ema
    }

    pub fn params(&self) -> &MarketStateParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_maker::ema::{factor_for, EmaController, EmaParams};

    fn state() -> MarketState {
        MarketState::new(
            MarketStateParams::default(),
            EmaController::shared(EmaParams::default()),
        )
    }

    fn level(price: f64, quantity: f64) -> BookLevel {
        BookLevel { price, quantity }
    }

    #[test]
    fn test_starts_zeroed_and_not_ready() {
        let state = state();
        assert_eq!(state.snapshot(), MarketSnapshot::default());
        assert_eq!(state.readiness(), Readiness::default());
        assert!(!state.readiness().all());
    }

    #[test]
    fn test_ticker_sets_mid_and_ready() {
        let state = state();
        state.update_ticker(100.0, 102.0);
        assert_eq!(state.mid_price(), 101.0);
        assert!(state.readiness().ticker);
    }

    #[test]
    fn test_repeated_ticker_is_idempotent() {
        let state = state();
        for price in [100.0, 101.5, 99.0] {
            state.update_trade(price);
        }
        state.update_ticker(100.0, 101.0);
        state.update_orderbook(&[level(100.0, 2.0)], &[level(101.0, 3.0)]);
        let before = state.snapshot();
        state.update_ticker(100.0, 101.0);
        state.update_ticker(100.0, 101.0);
        let after = state.snapshot();
        assert_eq!(before, after);
    }

    #[test]
    fn test_trade_updates_volatility_and_ema_factor() {
        let state = state();
        state.update_trade(100.0);
        state.update_trade(104.0);
        assert!((state.volatility() - 2.0).abs() < 1e-12);
        assert!(state.readiness().trade);
        let expected = factor_for(&EmaParams::default(), 2.0);
        assert_eq!(state.ema().lock().ema_factor(), expected);
        // The average itself is only advanced by the optimisation cycle.
        assert!(!state.ema().lock().is_initialized());
    }

    #[test]
    fn test_orderbook_liquidity_and_depth() {
        let state = state();
        state.update_ticker(100.0, 100.0);
        let bids = [
            level(100.0, 1.0),
            level(99.5, 2.0),
            level(98.9, 4.0), // outside 1%, inside 5%
            level(94.0, 8.0), // outside both
        ];
        let asks = [
            level(100.5, 3.0),
            level(100.9, 1.0),
            level(103.0, 5.0), // outside 1%, inside 5%
        ];
        state.update_orderbook(&bids, &asks);
        // bids within 1%: 1 + 2 = 3; asks within 1%: 3 + 1 = 4
        assert!((state.liquidity() - 3.5).abs() < 1e-12);
        // bid levels within 5%: 3; ask levels within 5%: 3
        assert!((state.order_book_depth() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_orderbook_uses_stale_mid() {
        let state = state();
        // No ticker yet: mid is zero so every bid qualifies and no ask does.
        state.update_orderbook(&[level(100.0, 2.0)], &[level(101.0, 3.0)]);
        assert!((state.liquidity() - 1.0).abs() < 1e-12);
        assert!((state.order_book_depth() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_orderbook_ready_gated_by_trade_count() {
        let state = state();
        state.update_ticker(100.0, 101.0);
        for i in 0..TRADE_WINDOW_LEN {
            state.update_orderbook(&[level(100.0, 1.0)], &[level(101.0, 1.0)]);
            assert!(
                !state.readiness().order_book,
                "ready after only {i} trades"
            );
            state.update_trade(100.0 + i as f64 * 0.1);
        }
        // Window is full, but readiness only flips on the next book message.
        assert!(!state.readiness().order_book);
        state.update_orderbook(&[level(100.0, 1.0)], &[level(101.0, 1.0)]);
        let readiness = state.readiness();
        assert!(readiness.order_book);
        assert!(readiness.all());
    }

    #[test]
    fn test_concurrent_updates_keep_window_bounded() {
        use std::{sync::Arc, thread};

        let state = Arc::new(state());
        let writer = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for i in 0..500 {
                    state.update_trade(100.0 + (i % 7) as f64);
                    state.update_ticker(100.0, 101.0 + (i % 3) as f64);
                }
            })
        };
        let ema = Arc::clone(state.ema());
        let reader = thread::spawn(move || {
            for _ in 0..500 {
                ema.lock().update_ema(1.0);
            }
        });
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(state.trade_count(), TRADE_WINDOW_LEN);
        assert!(state.volatility().is_finite());
    }
}
