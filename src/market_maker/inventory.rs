use super::types::{FillOutcome, FillSide};

/// Cash and crypto balances of the simulated market maker.
///
/// Single writer: only the optimisation loop mutates it, so it carries no lock.
#[derive(Clone, Debug, PartialEq)]
pub struct Inventory {
    cash_balance: f64,
    crypto_balance: f64,
    trading_fee_rate: f64,
}

impl Inventory {
    pub fn new(cash_balance: f64, crypto_balance: f64, trading_fee_rate: f64) -> Self {
        Self {
            cash_balance,
            crypto_balance,
            trading_fee_rate,
        }
    }

    /// `(cash, crypto)`.
    pub fn balances(&self) -> (f64, f64) {
        (self.cash_balance, self.crypto_balance)
    }

    pub fn cash_balance(&self) -> f64 {
        self.cash_balance
    }

    pub fn crypto_balance(&self) -> f64 {
        self.crypto_balance
    }

    pub fn trading_fee_rate(&self) -> f64 {
        self.trading_fee_rate
    }

    pub fn total_value(&self, price: f64) -> f64 {
        self.cash_balance + self.crypto_balance * price
    }

    /// All-or-nothing fill of the engine's own quote. This is the rule the optimisation
    /// loop applies.
    ///
    /// A price at or below the bid spends all cash, one at or above the ask sells all
    /// crypto; the fee is taken off the quantity. Checked in that order, so a crossed
    /// quote buys. A price that is not positive and finite never fills.
    pub fn apply_fill(&mut self, current_price: f64, bid: f64, ask: f64) -> FillOutcome {
        if !(current_price.is_finite() && current_price > 0.0) {
            tracing::warn!(current_price, "skipping fill at a non-positive price");
            return FillOutcome::NoFill;
        }
        if current_price <= bid {
            let quantity = self.cash_balance / current_price * (1.0 - self.trading_fee_rate);
            self.crypto_balance += quantity;
            self.cash_balance -= quantity * current_price;
            FillOutcome::Bought {
                quantity,
                price: current_price,
            }
        } else if current_price >= ask {
            let quantity = self.crypto_balance * (1.0 - self.trading_fee_rate);
            self.cash_balance += quantity * current_price;
            self.crypto_balance -= quantity;
            FillOutcome::Sold {
                quantity,
                price: current_price,
            }
        } else {
            FillOutcome::NoFill
        }
    }

    /// Books a trade of `quantity` at `price` with the fee charged on notional,
    /// `rate * price * quantity / 100`.
    ///
    /// Not used by the optimisation loop; [`apply_fill`](Self::apply_fill) is.
    pub fn adjust_balance(&mut self, side: FillSide, quantity: f64, price: f64) {
        let notional = price * quantity;
        let fee = self.trading_fee_rate * notional / 100.0;
        match side {
            FillSide::Buy => {
                self.cash_balance -= notional + fee;
                self.crypto_balance += quantity;
            }
            FillSide::Sell => {
                self.cash_balance += notional - fee;
                self.crypto_balance -= quantity;
            }
        }
    }
}
