use super::{
    config::MarketMakerConfig,
    inventory::Inventory,
    market_state::MarketState,
    spreads::SpreadOptimizer,
    types::{CycleReport, LoopState, QuoteStatus},
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Waits for every feed channel to report data, then optimises and fills at the cadence
/// chosen by the EMA controller until cancelled.
#[derive(Debug)]
pub struct Orchestrator {
    market: Arc<MarketState>,
    optimizer: SpreadOptimizer,
    inventory: Inventory,
    poll_interval: Duration,
    state: LoopState,
    cycles: u64,
    last_report: Option<CycleReport>,
}

impl Orchestrator {
    pub fn new(
        market: Arc<MarketState>,
        optimizer: SpreadOptimizer,
        inventory: Inventory,
        poll_interval: Duration,
    ) -> Self {
        Self {
            market,
            optimizer,
            inventory,
            poll_interval,
            state: LoopState::WaitingReady,
            cycles: 0,
            last_report: None,
        }
    }

    pub fn from_config(config: &MarketMakerConfig, market: Arc<MarketState>) -> Self {
        Self::new(
            market,
            SpreadOptimizer::new(config.optimizer_params()),
            config.inventory(),
            config.readiness_poll_interval(),
        )
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn optimizer_mut(&mut self) -> &mut SpreadOptimizer {
        &mut self.optimizer
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Runs until `token` is cancelled. Both the readiness poll and the cadence sleep
    /// return as soon as it is.
    pub async fn run(&mut self, token: CancellationToken) {
        info!(
            poll_secs = self.poll_interval.as_secs_f64(),
            "Waiting for order book, trade and ticker data"
        );
        loop {
            let readiness = self.market.readiness();
            if readiness.all() {
                break;
            }
            debug!(
                order_book = readiness.order_book,
                trade = readiness.trade,
                ticker = readiness.ticker,
                trades = self.market.trade_count(),
                "Market data not ready"
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Stopped before market data was ready");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.state = LoopState::Cycling;
        info!("Market data ready, starting optimisation cycles");

        loop {
            if token.is_cancelled() {
                break;
            }
            let report = self.run_cycle();
            let pause = Duration::from_secs(report.next_cadence_minutes * 60);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        info!(cycles = self.cycles, "Optimisation loop stopped");
    }

    /// One optimise, fill, EMA and cadence step against the current statistics.
    pub fn run_cycle(&mut self) -> CycleReport {
        let snapshot = self.market.snapshot();
        let quote = self.optimizer.optimize_spread(
            snapshot.mid_price,
            &self.inventory,
            snapshot.volatility,
            snapshot.liquidity,
            snapshot.order_book_depth,
        );
        let fill = self
            .inventory
            .apply_fill(snapshot.mid_price, quote.bid, quote.ask);

        let (ema_volatility, next_cadence_minutes) = {
            let mut ema = self.market.ema().lock();
            if quote.status != QuoteStatus::Neutral {
                ema.update_ema(snapshot.volatility);
            }
            (ema.ema_volatility(), ema.next_cadence_minutes())
        };

        self.cycles += 1;
        let (cash_balance, crypto_balance) = self.inventory.balances();
        let report = CycleReport {
            cycle: self.cycles,
            snapshot,
            quote,
            fill,
            cash_balance,
            crypto_balance,
            ema_volatility,
            next_cadence_minutes,
        };
        info!(
            cycle = report.cycle,
            mid_price = snapshot.mid_price,
            volatility = snapshot.volatility,
            liquidity = snapshot.liquidity,
            depth = snapshot.order_book_depth,
            bid = quote.bid,
            ask = quote.ask,
            status = ?quote.status,
            fill = ?fill,
            cash = cash_balance,
            crypto = crypto_balance,
            ema_volatility,
            next_cadence_minutes,
            "Optimisation cycle complete"
        );
        self.last_report = Some(report.clone());
        report
    }
}
