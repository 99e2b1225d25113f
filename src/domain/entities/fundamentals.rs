use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally computed fundamental scores, each on a 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalScore {
    pub overall_score: f64,
    pub valuation_score: f64,
    pub profitability_score: f64,
    pub growth_score: f64,
    #[serde(default)]
    pub financial_health_score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// Composite value score from the value analysis, 0-100
    #[serde(default)]
    pub value_score: Option<f64>,
    #[serde(default)]
    pub pe_score: Option<f64>,
    #[serde(default)]
    pub pb_score: Option<f64>,
}

/// Quarter-over-quarter momentum classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MomentumTrend {
    Strong,
    Moderate,
    Weak,
    Negative,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthSnapshot {
    /// Trailing 1-year revenue growth in percent
    #[serde(default)]
    pub revenue_growth_1y: Option<f64>,
    /// Trailing 1-year profit growth in percent
    #[serde(default)]
    pub profit_growth_1y: Option<f64>,
    #[serde(default)]
    pub growth_score: Option<f64>,
    #[serde(default)]
    pub revenue_momentum: MomentumTrend,
    #[serde(default)]
    pub profit_momentum: MomentumTrend,
    /// Quarterly momentum score, 0-100
    #[serde(default)]
    pub momentum_score: Option<f64>,
}

/// Reported results versus consensus, in percent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsSurprise {
    #[serde(default)]
    pub revenue_surprise_pct: Option<f64>,
    #[serde(default)]
    pub eps_surprise_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketCapTier {
    Large,
    Mid,
    Small,
}

impl MarketCapTier {
    pub fn classify(market_cap: f64, large_threshold: f64, mid_threshold: f64) -> Option<Self> {
        if !market_cap.is_finite() || market_cap <= 0.0 {
            return None;
        }
        Some(if market_cap >= large_threshold {
            MarketCapTier::Large
        } else if market_cap >= mid_threshold {
            MarketCapTier::Mid
        } else {
            MarketCapTier::Small
        })
    }
}
