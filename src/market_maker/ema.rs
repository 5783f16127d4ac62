//! Volatility EMA whose smoothing factor follows realised volatility and which sets the
//! requoting cadence.
//!
//! The factor is adjusted by the trade handler on every trade while the average itself
//! is advanced by the optimisation cycle, so a cycle may smooth with a factor derived
//! from a later sample than the one it folds in.

use parking_lot::Mutex;
use std::sync::Arc;

/// Smoothing factor used until the first trade adjusts it.
const INITIAL_FACTOR: f64 = 0.1;

/// EMA controller shared between the feed task and the optimisation loop.
pub type SharedEma = Arc<Mutex<EmaController>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmaParams {
    pub min_factor: f64,
    pub max_factor: f64,
    pub low_threshold: f64,
    pub high_threshold: f64,
}

impl Default for EmaParams {
    fn default() -> Self {
        Self {
            min_factor: 0.05,
            max_factor: 0.5,
            low_threshold: 0.5,
            high_threshold: 2.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmaController {
    params: EmaParams,
    initialized: bool,
    ema_volatility: f64,
    ema_factor: f64,
}

impl EmaController {
    pub fn new(params: EmaParams) -> Self {
        Self {
            params,
            initialized: false,
            ema_volatility: 0.0,
            ema_factor: INITIAL_FACTOR.clamp(params.min_factor, params.max_factor),
        }
    }

    pub fn shared(params: EmaParams) -> SharedEma {
        Arc::new(Mutex::new(Self::new(params)))
    }

    /// Re-derives the smoothing factor from the latest volatility sample.
    pub fn adjust_factor(&mut self, volatility: f64) {
        self.ema_factor = factor_for(&self.params, volatility);
    }

    /// Folds a volatility sample into the average using the current factor.
    pub fn update_ema(&mut self, volatility: f64) {
        if !self.initialized {
            self.ema_volatility = volatility;
            self.initialized = true;
        } else {
            self.ema_volatility =
                (1.0 - self.ema_factor) * self.ema_volatility + self.ema_factor * volatility;
        }
    }

    /// Minutes to wait before the next optimisation.
    pub fn next_cadence_minutes(&self) -> u64 {
        if self.ema_volatility > 1.5 {
            1
        } else if self.ema_volatility > 1.0 {
            5
        } else {
            10
        }
    }

    pub fn ema_volatility(&self) -> f64 {
        self.ema_volatility
    }

    pub fn ema_factor(&self) -> f64 {
        self.ema_factor
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn params(&self) -> &EmaParams {
        &self.params
    }
}

impl Default for EmaController {
    fn default() -> Self {
        Self::new(EmaParams::default())
    }
}

/// Piecewise-linear map from volatility to smoothing factor, clamped to
/// `[min_factor, max_factor]` outside `[low_threshold, high_threshold]`.
pub fn factor_for(params: &EmaParams, volatility: f64) -> f64 {
    if volatility <= params.low_threshold {
        params.min_factor
    } else if volatility >= params.high_threshold {
        params.max_factor
    } else {
        let scale =
            (volatility - params.low_threshold) / (params.high_threshold - params.low_threshold);
        params.min_factor + scale * (params.max_factor - params.min_factor)
    }
}
