use crate::domain::entities::Candle;
use crate::domain::repositories::{IndicatorSnapshot, TechnicalIndicatorEngine};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Substitute range used when a bar has no high-low spread
const FLAT_BAR_RANGE: f64 = 0.01;

pub trait Indicator {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;
}

fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close.value()).collect()
}

pub struct SMA {
    pub period: usize,
}

impl SMA {
    pub fn new(period: usize) -> Self {
        SMA { period }
    }

    pub fn calculate_on_values(&self, values: &[f64]) -> Vec<f64> {
        if self.period == 0 || values.len() < self.period {
            return vec![];
        }
        values
            .windows(self.period)
            .map(|w| w.iter().sum::<f64>() / self.period as f64)
            .collect()
    }
}

impl Indicator for SMA {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        self.calculate_on_values(&closes(candles))
    }
}

pub struct EMA {
    pub period: usize,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        EMA { period }
    }

    /// Seeded with the SMA of the first `period` values, one output per value after that
    pub fn calculate_on_values(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() || self.period == 0 {
            return vec![];
        }
        let mut ema_values = Vec::with_capacity(values.len());
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        let initial_count = self.period.min(values.len());
        let mut ema = values[..initial_count].iter().sum::<f64>() / initial_count as f64;
        ema_values.push(ema);

        for &val in values.iter().skip(self.period) {
            ema = (val - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

impl Indicator for EMA {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        self.calculate_on_values(&closes(candles))
    }
}

pub struct RSI {
    pub period: usize,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        RSI { period }
    }
}

impl Indicator for RSI {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period + 1 {
            return vec![];
        }
        let mut gains = Vec::with_capacity(candles.len() - 1);
        let mut losses = Vec::with_capacity(candles.len() - 1);

        for pair in candles.windows(2) {
            let change = pair[1].close.value() - pair[0].close.value();
            if change > 0.0 {
                gains.push(change);
                losses.push(0.0);
            } else {
                gains.push(0.0);
                losses.push(change.abs());
            }
        }

        gains
            .windows(self.period)
            .zip(losses.windows(self.period))
            .map(|(g, l)| {
                let avg_gain = g.iter().sum::<f64>() / self.period as f64;
                let avg_loss = l.iter().sum::<f64>() / self.period as f64;
                if avg_loss == 0.0 {
                    return if avg_gain == 0.0 { 50.0 } else { 100.0 };
                }
                let rs = avg_gain / avg_loss;
                100.0 - (100.0 / (1.0 + rs))
            })
            .collect()
    }
}

/// MACD histogram: MACD line minus its signal line
pub struct MACD {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        MACD {
            fast_period,
            slow_period,
            signal_period,
        }
    }
}

impl Indicator for MACD {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.slow_period + self.signal_period {
            return vec![];
        }
        let values = closes(candles);
        let fast_values = EMA::new(self.fast_period).calculate_on_values(&values);
        let slow_values = EMA::new(self.slow_period).calculate_on_values(&values);

        // Both series end on the latest bar; align them from the tail.
        let offset = fast_values.len().saturating_sub(slow_values.len());
        let macd_line: Vec<f64> = fast_values[offset..]
            .iter()
            .zip(slow_values.iter())
            .map(|(f, s)| f - s)
            .collect();

        let signal_line = EMA::new(self.signal_period).calculate_on_values(&macd_line);
        let offset = macd_line.len().saturating_sub(signal_line.len());
        macd_line[offset..]
            .iter()
            .zip(signal_line.iter())
            .map(|(m, s)| m - s)
            .collect()
    }
}

/// Elder force index: close change times volume over the bar range, smoothed by an SMA
pub struct ElderForceIndex {
    pub period: usize,
}

impl ElderForceIndex {
    pub fn new(period: usize) -> Self {
        ElderForceIndex { period }
    }
}

impl Indicator for ElderForceIndex {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let raw: Vec<f64> = candles
            .windows(2)
            .map(|pair| {
                let change = pair[1].close.value() - pair[0].close.value();
                let range = pair[1].range();
                let range = if range > 0.0 { range } else { FLAT_BAR_RANGE };
                change * pair[1].volume / range
            })
            .collect();
        SMA::new(self.period).calculate_on_values(&raw)
    }
}

/// Annualized standard deviation of close-to-close returns
pub fn annualized_volatility(candles: &[Candle]) -> Option<f64> {
    let returns: Vec<f64> = candles
        .windows(2)
        .filter(|pair| pair[0].close.value() > 0.0)
        .map(|pair| pair[1].close.value() / pair[0].close.value() - 1.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
}

fn last_two(values: &[f64]) -> (Option<f64>, Option<f64>) {
    match values {
        [.., prev, last] => (Some(*last), Some(*prev)),
        [last] => (Some(*last), None),
        [] => (None, None),
    }
}

/// Built-in indicator engine: EFI(20), RSI(14), MACD(12, 26, 9), SMA(20/50)
pub struct DefaultIndicatorEngine {
    pub efi_period: usize,
    pub rsi_period: usize,
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for DefaultIndicatorEngine {
    fn default() -> Self {
        DefaultIndicatorEngine {
            efi_period: 20,
            rsi_period: 14,
            short_window: 20,
            long_window: 50,
        }
    }
}

impl TechnicalIndicatorEngine for DefaultIndicatorEngine {
    fn compute(&self, series: &[Candle]) -> IndicatorSnapshot {
        let efi = ElderForceIndex::new(self.efi_period).calculate(series);
        let (oscillator_value, previous_oscillator_value) = last_two(&efi);

        let macd = MACD::new(12, 26, 9).calculate(series);
        let (macd_histogram, previous_macd_histogram) = last_two(&macd);

        let volumes: Vec<f64> = series.iter().map(|c| c.volume).collect();

        IndicatorSnapshot {
            oscillator_value,
            previous_oscillator_value,
            rsi: RSI::new(self.rsi_period).calculate(series).last().copied(),
            macd_histogram,
            previous_macd_histogram,
            sma_short: SMA::new(self.short_window).calculate(series).last().copied(),
            sma_long: SMA::new(self.long_window).calculate(series).last().copied(),
            volatility: annualized_volatility(series),
            last_close: series.last().map(|c| c.close.value()),
            last_volume: series.last().map(|c| c.volume),
            average_volume: SMA::new(self.short_window)
                .calculate_on_values(&volumes)
                .last()
                .copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle::new(close, close + 1.0, close - 1.0, close, volume).unwrap()
    }

    fn trending(n: usize, start: f64, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(start + step * i as f64, 1000.0))
            .collect()
    }

    #[test]
    fn test_ema_calculation() {
        let candles = vec![
            Candle::new(100.0, 105.0, 95.0, 102.0, 1000.0).unwrap(),
            Candle::new(102.0, 108.0, 98.0, 105.0, 1100.0).unwrap(),
            Candle::new(105.0, 110.0, 100.0, 108.0, 1200.0).unwrap(),
        ];
        let values = EMA::new(2).calculate(&candles);
        assert_eq!(values.len(), 2);
        assert!((values[0] - 103.5).abs() < 1e-9);
        assert!(values[1] > values[0]);
    }

    #[test]
    fn test_sma_windows() {
        let values = SMA::new(3).calculate_on_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(values, vec![2.0, 3.0]);
        assert!(SMA::new(5).calculate_on_values(&[1.0]).is_empty());
    }

    #[test]
    fn test_rsi_bounds() {
        let candles = vec![
            Candle::new(100.0, 105.0, 95.0, 102.0, 1000.0).unwrap(),
            Candle::new(102.0, 108.0, 98.0, 105.0, 1100.0).unwrap(),
            Candle::new(105.0, 110.0, 100.0, 108.0, 1200.0).unwrap(),
            Candle::new(108.0, 112.0, 103.0, 106.0, 1300.0).unwrap(),
            Candle::new(106.0, 111.0, 102.0, 109.0, 1400.0).unwrap(),
        ];
        let values = RSI::new(2).calculate(&candles);
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_rsi_only_gains_is_100() {
        let values = RSI::new(14).calculate(&trending(20, 100.0, 1.0));
        assert_eq!(values.last().copied(), Some(100.0));
    }

    #[test]
    fn test_efi_sign_follows_price_direction() {
        let up = ElderForceIndex::new(5).calculate(&trending(10, 100.0, 1.0));
        assert!(up.iter().all(|v| *v > 0.0));
        let down = ElderForceIndex::new(5).calculate(&trending(10, 100.0, -1.0));
        assert!(down.iter().all(|v| *v < 0.0));
    }

    #[test]
    fn test_efi_flat_bar_uses_substitute_range() {
        let candles = vec![
            Candle::new(10.0, 10.0, 10.0, 10.0, 100.0).unwrap(),
            Candle::new(10.5, 10.5, 10.5, 10.5, 100.0).unwrap(),
        ];
        let values = ElderForceIndex::new(1).calculate(&candles);
        assert!((values[0] - 0.5 * 100.0 / 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_macd_histogram_needs_history() {
        assert!(MACD::new(12, 26, 9).calculate(&trending(30, 100.0, 1.0)).is_empty());
        assert!(!MACD::new(12, 26, 9).calculate(&trending(60, 100.0, 1.0)).is_empty());
    }

    #[test]
    fn test_volatility_of_constant_series_is_zero() {
        let candles: Vec<Candle> = (0..10).map(|_| candle(50.0, 10.0)).collect();
        assert_eq!(annualized_volatility(&candles), Some(0.0));
        assert_eq!(annualized_volatility(&candles[..2]), None);
    }

    #[test]
    fn test_default_engine_snapshot() {
        let series = trending(60, 100.0, 0.5);
        let snapshot = DefaultIndicatorEngine::default().compute(&series);
        assert!(snapshot.oscillator_value.unwrap() > 0.0);
        assert!(snapshot.previous_oscillator_value.is_some());
        assert!(snapshot.sma_short.unwrap() > snapshot.sma_long.unwrap());
        assert_eq!(snapshot.last_close, Some(129.5));
        assert_eq!(snapshot.average_volume, Some(1000.0));
    }

    #[test]
    fn test_default_engine_on_short_series() {
        let snapshot = DefaultIndicatorEngine::default().compute(&trending(3, 100.0, 1.0));
        assert!(snapshot.oscillator_value.is_none());
        assert!(snapshot.sma_long.is_none());
        assert_eq!(snapshot.last_close, Some(102.0));
    }
}
