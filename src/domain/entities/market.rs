use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::Price;

/// One OHLCV bar. Series are ordered oldest to newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Result<Self, ValidationError> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(ValidationError::InvalidCandle(format!(
                "volume must be finite and non-negative, got {}",
                volume
            )));
        }
        if high < low {
            return Err(ValidationError::InvalidCandle(format!(
                "high {} below low {}",
                high, low
            )));
        }
        Ok(Candle {
            open: Price::new(open)?,
            high: Price::new(high)?,
            low: Price::new(low)?,
            close: Price::new(close)?,
            volume,
        })
    }

    pub fn range(&self) -> f64 {
        self.high.value() - self.low.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "D")]
    Daily,
    #[serde(rename = "W")]
    Weekly,
}

/// Live quote snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last_price: Price,
    /// Percent change versus previous close, e.g. `2.5` for +2.5%
    pub change_pct: f64,
    pub volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_new_valid() {
        let c = Candle::new(100.0, 105.0, 95.0, 102.0, 1000.0).unwrap();
        assert_eq!(c.range(), 10.0);
    }

    #[test]
    fn test_candle_rejects_inverted_range() {
        assert!(Candle::new(100.0, 90.0, 95.0, 92.0, 10.0).is_err());
    }

    #[test]
    fn test_candle_rejects_negative_volume() {
        assert!(Candle::new(100.0, 101.0, 99.0, 100.0, -5.0).is_err());
    }

    #[test]
    fn test_timeframe_serde_codes() {
        assert_eq!(serde_json::to_string(&Timeframe::Daily).unwrap(), "\"D\"");
    }
}
