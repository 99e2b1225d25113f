use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;

/// Probability-like strength of a signal, always within [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);

    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if (0.0..=1.0).contains(&value) {
            Ok(Confidence(value))
        } else {
            Err(ValidationError::InvalidConfidence(format!(
                "confidence must be in [0.0, 1.0], got {}",
                value
            )))
        }
    }

    /// Clamp an arbitrary score into range. NaN maps to zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Confidence(0.0)
        } else {
            Confidence(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn capped_at(&self, cap: f64) -> Self {
        Confidence::clamped(self.0.min(cap))
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Confidence::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}
