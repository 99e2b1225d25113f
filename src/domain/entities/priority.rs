use serde::{Deserialize, Serialize};

use crate::domain::entities::signal::Urgency;

/// Why an entity entered the working set, ordered from most to least pressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityCategory {
    /// Recent order or high-impact corporate event
    EventDriven,
    /// Upcoming or just-published results
    Results,
    /// Strong fundamental score
    Fundamental,
    /// Trailing growth momentum
    Momentum,
    /// Static or configured watchlist only
    Watchlist,
}

impl PriorityCategory {
    pub fn default_urgency(&self) -> Urgency {
        match self {
            PriorityCategory::EventDriven => Urgency::High,
            PriorityCategory::Results => Urgency::Medium,
            _ => Urgency::Low,
        }
    }
}

/// Heuristic ranking value used to bound per-cycle work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityScore {
    pub entity: String,
    /// Score in [0.0, 100.0]
    pub score: f64,
    pub reasons: Vec<String>,
    pub category: PriorityCategory,
    pub urgency: Urgency,
}

impl PriorityScore {
    pub fn new(
        entity: String,
        score: f64,
        reasons: Vec<String>,
        category: PriorityCategory,
    ) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        PriorityScore {
            entity,
            score,
            reasons,
            urgency: category.default_urgency(),
            category,
        }
    }
}
