use serde::{Deserialize, Serialize};

use crate::domain::entities::Candle;

/// Latest indicator readings over a price series
///
/// Every field is optional: an engine reports only what the series length
/// allows it to compute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Smoothed EFI value on the latest bar
    pub oscillator_value: Option<f64>,
    /// Smoothed EFI value on the bar before
    pub previous_oscillator_value: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub previous_macd_histogram: Option<f64>,
    /// Short moving average (20 bars)
    pub sma_short: Option<f64>,
    /// Long moving average (50 bars)
    pub sma_long: Option<f64>,
    /// Annualized standard deviation of daily close-to-close returns
    pub volatility: Option<f64>,
    pub last_close: Option<f64>,
    pub last_volume: Option<f64>,
    /// Mean volume over the short window
    pub average_volume: Option<f64>,
}

/// Opaque indicator math. Any conforming implementation is substitutable.
pub trait TechnicalIndicatorEngine: Send + Sync {
    fn compute(&self, series: &[Candle]) -> IndicatorSnapshot;
}
