use ringbuffer::{AllocRingBuffer, RingBuffer, RingBufferExt, RingBufferRead, RingBufferWrite};

/// Number of recent trades kept for the volatility estimate.
pub const TRADE_WINDOW_LEN: usize = 50;

/// Bounded history of the most recent trade prices.
///
/// Volatility is the population standard deviation of every price currently held,
/// recomputed in full on each push.
#[derive(Clone, Debug)]
pub struct TradeWindow {
    capacity: usize,
    prices: AllocRingBuffer<f64>,
    volatility: f64,
}

impl TradeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            prices: AllocRingBuffer::with_capacity(capacity.next_power_of_two().max(2)),
            volatility: 0.0,
        }
    }

    /// Records a trade price, evicting the oldest one once the window is full, and
    /// returns the refreshed volatility.
    pub fn push(&mut self, price: f64) -> f64 {
        self.prices.push(price);
        while self.prices.len() > self.capacity {
            let _ = self.prices.dequeue();
        }
        self.volatility = population_std_dev(self.prices.iter().copied());
        self.volatility
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.len() == 0
    }
}

impl Default for TradeWindow {
    fn default() -> Self {
        Self::new(TRADE_WINDOW_LEN)
    }
}

/// Population standard deviation, `sqrt(mean(p^2) - mean(p)^2)`, accumulated in one
/// Welford pass. Fewer than two samples yield 0.
pub fn population_std_dev(samples: impl IntoIterator<Item = f64>) -> f64 {
    let mut count = 0usize;
    let mut mean = 0.0;
    let mut sum_sq = 0.0;
    for value in samples {
        count += 1;
        let delta = value - mean;
        mean += delta / count as f64;
        sum_sq += delta * (value - mean);
    }
    if count < 2 {
        return 0.0;
    }
    (sum_sq / count as f64).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::statistics::Statistics;

    fn direct_formula(prices: &[f64]) -> f64 {
        let n = prices.len() as f64;
        let mean = prices.iter().sum::<f64>() / n;
        let mean_sq = prices.iter().map(|p| p * p).sum::<f64>() / n;
        (mean_sq - mean * mean).max(0.0).sqrt()
    }

    #[test]
    fn test_empty_and_single_sample_have_zero_volatility() {
        let mut window = TradeWindow::default();
        assert_eq!(window.volatility(), 0.0);
        assert_eq!(window.push(26080.15), 0.0);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_two_samples() {
        let mut window = TradeWindow::default();
        window.push(100.0);
        let vol = window.push(102.0);
        assert!((vol - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_tracks_last_fifty_prices() {
        let mut window = TradeWindow::default();
        let mut history = Vec::new();
        for i in 0..180 {
            let price = 26_000.0 + ((i * 37) % 23) as f64 * 0.7 - (i as f64 * 0.013);
            history.push(price);
            let vol = window.push(price);

            let start = history.len().saturating_sub(TRADE_WINDOW_LEN);
            let held = &history[start..];
            assert_eq!(window.len(), held.len());
            if held.len() >= 2 {
                let expected = held.iter().population_std_dev();
                assert!(
                    (vol - expected).abs() < 1e-9,
                    "step {i}: got {vol}, expected {expected}"
                );
                assert!((vol - direct_formula(held)).abs() < 1e-4);
            } else {
                assert_eq!(vol, 0.0);
            }
        }
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut window = TradeWindow::new(5);
        for i in 0..12 {
            window.push(i as f64);
            assert!(window.len() <= 5);
        }
        assert_eq!(window.len(), 5);
        let expected = population_std_dev([7.0, 8.0, 9.0, 10.0, 11.0]);
        assert!((window.volatility() - expected).abs() < 1e-12);
        assert!((expected - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_prices_do_not_produce_nan() {
        let mut window = TradeWindow::default();
        for _ in 0..60 {
            window.push(26080.15);
        }
        assert!(!window.volatility().is_nan());
        assert!(window.volatility() < 1e-9);
    }
}
