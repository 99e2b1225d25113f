use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value >= 0.0 {
            Ok(Price(value))
        } else {
            Err(ValidationError::InvalidPrice(format!(
                "price must be non-negative, got {}",
                value
            )))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Scale the price by `factor`, e.g. `0.97` for a 3% stop below
    pub fn scale(&self, factor: f64) -> Result<Price, ValidationError> {
        if !factor.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        Price::new(self.0 * factor)
    }
}

impl TryFrom<f64> for Price {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Price::new(value)
    }
}

impl From<Price> for f64 {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(100.0);
        assert!(price.is_ok());
        assert_eq!(price.unwrap().value(), 100.0);
    }

    #[test]
    fn test_price_new_negative() {
        let price = Price::new(-10.0);
        assert!(matches!(price, Err(ValidationError::InvalidPrice(_))));
    }

    #[test]
    fn test_price_new_nan() {
        assert_eq!(Price::new(f64::NAN), Err(ValidationError::MustBeFinite));
    }

    #[test]
    fn test_price_scale() {
        let price = Price::new(200.0).unwrap();
        let stop = price.scale(0.95).unwrap();
        assert!((stop.value() - 190.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_scale_negative_factor() {
        let price = Price::new(10.0).unwrap();
        assert!(price.scale(-2.0).is_err());
    }

    #[test]
    fn test_price_deserialize_rejects_negative() {
        let parsed: Result<Price, _> = serde_json::from_str("-1.0");
        assert!(parsed.is_err());
        let parsed: Price = serde_json::from_str("12.5").unwrap();
        assert_eq!(parsed.value(), 12.5);
    }
}
