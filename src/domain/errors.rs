use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors raised while running an analysis cycle
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "message")]
pub enum EngineError {
    #[error("insufficient market data for {entity}: need {required} points, have {available}")]
    InsufficientMarketData {
        entity: String,
        required: usize,
        available: usize,
    },

    #[error("aggregation failed for {entity}: {reason}")]
    AggregationFailed { entity: String, reason: String },

    #[error("risk evaluation failed for {entity}: {reason}")]
    RiskEvaluationFailed { entity: String, reason: String },

    #[error("signal sink rejected composite for {entity}")]
    SinkRejected { entity: String },

    #[error("upstream provider failure: {0}")]
    Provider(String),

    #[error("cycle actor unavailable: {0}")]
    ActorUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        EngineError::Provider(e.to_string())
    }
}

impl<T> From<mpsc::error::SendError<T>> for EngineError {
    fn from(e: mpsc::error::SendError<T>) -> Self {
        EngineError::ActorUnavailable(e.to_string())
    }
}

impl From<oneshot::error::RecvError> for EngineError {
    fn from(e: oneshot::error::RecvError) -> Self {
        EngineError::ActorUnavailable(e.to_string())
    }
}

/// Errors surfaced by the read-only data ports and the output sinks
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for ProviderError {
    fn from(e: sqlx::Error) -> Self {
        ProviderError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Malformed(e.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid confidence: {0}")]
    InvalidConfidence(String),

    #[error("Invalid candle: {0}")]
    InvalidCandle(String),

    #[error("Value must be finite")]
    MustBeFinite,
}

impl From<ValidationError> for String {
    fn from(error: ValidationError) -> Self {
        error.to_string()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} out of range: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("source weights must be positive, got {source_name}={weight}")]
    NonPositiveWeight { source_name: String, weight: f64 },
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::InvalidConfiguration(e.to_string())
    }
}
