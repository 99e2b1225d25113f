use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderReceived,
    ResultsAnnouncement,
    BoardMeeting,
    Dividend,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn is_significant(&self) -> bool {
        matches!(self, ImpactLevel::High | ImpactLevel::Medium)
    }
}

/// A published or scheduled corporate event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateEvent {
    pub id: String,
    pub entity: String,
    pub event_type: EventType,
    pub impact: ImpactLevel,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub announced_at: DateTime<Utc>,
    /// Order value in currency units, when the filing states it
    #[serde(default)]
    pub order_value: Option<f64>,
    /// Set once the order collector has emitted a candidate for this event
    #[serde(default)]
    pub processed: bool,
}
