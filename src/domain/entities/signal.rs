use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Confidence, Price};

/// Trading action proposed by a candidate or a composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    StrongBuy,
    StrongSell,
    Avoid,
}

impl SignalAction {
    pub fn is_bullish(&self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::StrongBuy)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, SignalAction::Sell | SignalAction::StrongSell)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
            SignalAction::StrongBuy => "STRONG_BUY",
            SignalAction::StrongSell => "STRONG_SELL",
            SignalAction::Avoid => "AVOID",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence family a candidate was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Fundamental,
    Technical,
    Event,
    Momentum,
    Earnings,
    Order,
}

impl SignalSource {
    pub const ALL: [SignalSource; 6] = [
        SignalSource::Fundamental,
        SignalSource::Technical,
        SignalSource::Event,
        SignalSource::Momentum,
        SignalSource::Earnings,
        SignalSource::Order,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Fundamental => "fundamental",
            SignalSource::Technical => "technical",
            SignalSource::Event => "event",
            SignalSource::Momentum => "momentum",
            SignalSource::Earnings => "earnings",
            SignalSource::Order => "order",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-source suggestion produced by a collector. Lives for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub entity: String,
    pub action: SignalAction,
    pub confidence: Confidence,
    /// Usually one source; order announcements declare both `event` and `order`
    pub sources: BTreeSet<SignalSource>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SignalCandidate {
    /// Build a candidate, clamping `confidence` into [0.0, 1.0]
    pub fn new(
        entity: impl Into<String>,
        action: SignalAction,
        confidence: f64,
        source: SignalSource,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        SignalCandidate {
            entity: entity.into(),
            action,
            confidence: Confidence::clamped(confidence),
            sources,
            reason: reason.into(),
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, source: SignalSource) -> Self {
        self.sources.insert(source);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn signal_type(&self) -> Option<&str> {
        self.metadata.get("signal_type").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeHorizon {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

/// The fused decision for one entity in one cycle
///
/// Produced by the aggregator with neutral risk fields; the risk manager fills
/// in sizing, stop, target and urgency on admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSignal {
    pub entity: String,
    pub action: SignalAction,
    /// Never above 0.95
    pub confidence: Confidence,
    pub contributing_sources: BTreeSet<SignalSource>,
    /// "Composite signal (N factors): ..." summary line
    pub reason: String,
    /// Every contributing reason, sorted
    pub reasons: Vec<String>,
    pub risk_level: RiskLevel,
    pub position_size_pct: f64,
    pub reference_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub target_price: Option<Price>,
    pub urgency: Urgency,
    pub time_horizon: TimeHorizon,
    pub buy_score: f64,
    pub sell_score: f64,
    pub component_count: usize,
    /// Number of candidates in the winning group that carry the `event` source
    pub event_corroboration: usize,
    /// Latest timestamp among the contributing candidates
    pub generated_at: DateTime<Utc>,
}

impl CompositeSignal {
    pub fn is_buy(&self) -> bool {
        self.action.is_bullish()
    }
}
