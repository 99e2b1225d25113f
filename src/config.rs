use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::entities::SignalSource;
use crate::domain::errors::ConfigError;

/// Weights and thresholds used to fuse candidates into a composite
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub source_weights: BTreeMap<SignalSource, f64>,
    /// Weight for sources missing from `source_weights`
    pub default_weight: f64,
    pub min_confidence_threshold: f64,
    pub max_composite_confidence: f64,
    /// Reasons quoted verbatim in the composite summary line
    pub max_listed_reasons: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let mut source_weights = BTreeMap::new();
        source_weights.insert(SignalSource::Fundamental, 0.4);
        source_weights.insert(SignalSource::Technical, 0.3);
        source_weights.insert(SignalSource::Event, 0.2);
        source_weights.insert(SignalSource::Momentum, 0.1);

        AggregatorConfig {
            source_weights,
            default_weight: 0.1,
            min_confidence_threshold: 0.6,
            max_composite_confidence: 0.95,
            max_listed_reasons: 3,
        }
    }
}

impl AggregatorConfig {
    pub fn weight_of(&self, source: SignalSource) -> f64 {
        self.source_weights
            .get(&source)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

/// Portfolio heat limits and stop/target sizing, all percentages of capital
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub max_heat_pct: f64,
    pub max_position_size_pct: f64,
    /// Confidence at or above which the tight band applies
    pub high_confidence: f64,
    /// Confidence below which the wide band applies
    pub low_confidence: f64,
    pub tight_stop_pct: f64,
    pub normal_stop_pct: f64,
    pub wide_stop_pct: f64,
    /// Annualized return volatility above which risk is scaled up
    pub volatility_threshold: f64,
    pub volatility_multiplier: f64,
    /// Target distance as a multiple of the stop distance
    pub reward_to_risk: f64,
    pub urgent_price_move_pct: f64,
    pub min_event_corroboration: usize,
    pub medium_urgency_confidence: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_heat_pct: 6.0,
            max_position_size_pct: 5.0,
            high_confidence: 0.8,
            low_confidence: 0.6,
            tight_stop_pct: 3.0,
            normal_stop_pct: 5.0,
            wide_stop_pct: 7.0,
            volatility_threshold: 0.3,
            volatility_multiplier: 1.5,
            reward_to_risk: 2.0,
            urgent_price_move_pct: 2.0,
            min_event_corroboration: 2,
            medium_urgency_confidence: 0.7,
        }
    }
}

/// Ranking formula applied when discovery overflows the budget
///
/// ```text
/// score = fundamental * overall_score
///       + event * min(event_count * points_per_event, max_event_points)
///       + market_cap * tier_bonus
///       + freshness * (freshness_points if updated recently, else 0)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityWeights {
    pub fundamental: f64,
    pub event: f64,
    pub market_cap: f64,
    pub freshness: f64,
    pub points_per_event: f64,
    pub max_event_points: f64,
    pub freshness_points: f64,
    pub large_cap_bonus: f64,
    pub mid_cap_bonus: f64,
    pub small_cap_bonus: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        PriorityWeights {
            fundamental: 0.4,
            event: 0.3,
            market_cap: 0.2,
            freshness: 0.1,
            points_per_event: 20.0,
            max_event_points: 30.0,
            freshness_points: 10.0,
            large_cap_bonus: 20.0,
            mid_cap_bonus: 15.0,
            small_cap_bonus: 10.0,
        }
    }
}

impl PriorityWeights {
    fn fields(&self) -> [(&'static str, f64); 10] {
        [
            ("priority.weights.fundamental", self.fundamental),
            ("priority.weights.event", self.event),
            ("priority.weights.market_cap", self.market_cap),
            ("priority.weights.freshness", self.freshness),
            ("priority.weights.points_per_event", self.points_per_event),
            ("priority.weights.max_event_points", self.max_event_points),
            ("priority.weights.freshness_points", self.freshness_points),
            ("priority.weights.large_cap_bonus", self.large_cap_bonus),
            ("priority.weights.mid_cap_bonus", self.mid_cap_bonus),
            ("priority.weights.small_cap_bonus", self.small_cap_bonus),
        ]
    }
}

/// Discovery windows and scoring inputs for the working-set selection
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityConfig {
    pub max_companies_per_batch: usize,
    pub min_fundamental_score: f64,
    pub min_sub_score: f64,
    pub max_fundamental_leaders: usize,
    pub event_lookback_days: i64,
    pub upcoming_event_days: i64,
    pub results_lookback_days: i64,
    pub order_lookback_days: i64,
    pub min_revenue_growth_pct: f64,
    pub min_profit_growth_pct: f64,
    pub freshness_days: i64,
    pub large_cap_threshold: f64,
    pub mid_cap_threshold: f64,
    pub weights: PriorityWeights,
    pub watchlist: Vec<String>,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        PriorityConfig {
            max_companies_per_batch: 50,
            min_fundamental_score: 70.0,
            min_sub_score: 80.0,
            max_fundamental_leaders: 30,
            event_lookback_days: 7,
            upcoming_event_days: 7,
            results_lookback_days: 30,
            order_lookback_days: 14,
            min_revenue_growth_pct: 20.0,
            min_profit_growth_pct: 15.0,
            freshness_days: 30,
            large_cap_threshold: 2e11,
            mid_cap_threshold: 5e10,
            weights: PriorityWeights::default(),
            watchlist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub min_history_points: usize,
    pub history_days: u32,
    pub event_lookback_days: i64,
    pub max_events_considered: usize,
    pub order_lookback_hours: i64,
    pub volume_spike_multiple: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            min_history_points: 20,
            history_days: 365,
            event_lookback_days: 7,
            max_events_considered: 3,
            order_lookback_hours: 24,
            volume_spike_multiple: 2.0,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub aggregator: AggregatorConfig,
    pub risk: RiskConfig,
    pub priority: PriorityConfig,
    pub collectors: CollectorConfig,
    /// Entities processed concurrently per batch
    pub batch_size: usize,
    /// Soft time budget for a whole cycle
    pub cycle_time_budget_seconds: u64,
    /// Upper bound on how long a cached entity result stays valid
    pub cache_ttl_seconds: u64,
    pub cache_capacity: usize,
    /// Upstream lookups allowed per minute
    pub lookups_per_minute: u32,
    pub notify_high_urgency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            aggregator: AggregatorConfig::default(),
            risk: RiskConfig::default(),
            priority: PriorityConfig::default(),
            collectors: CollectorConfig::default(),
            batch_size: 10,
            cycle_time_budget_seconds: 300,
            cache_ttl_seconds: 3600,
            cache_capacity: 1024,
            lookups_per_minute: 600,
            notify_high_urgency: true,
        }
    }
}

/// Read `name` and parse it, keeping `current` when unset, unparsable or rejected by `accept`
fn env_override<T>(name: &str, current: T, accept: impl Fn(&T) -> bool) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    let raw = match std::env::var(name) {
        Ok(raw) => raw,
        Err(_) => return current,
    };

    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {:?} (out of range), using default: {:?}",
                name,
                value,
                current
            );
            current
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {:?}",
                name,
                raw,
                e,
                current
            );
            current
        }
    }
}

fn unit_interval(v: &f64) -> bool {
    (0.0..=1.0).contains(v)
}

fn percentage(v: &f64) -> bool {
    *v > 0.0 && *v <= 100.0
}

impl EngineConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> EngineConfig {
        let mut config = EngineConfig::default();

        let agg = &mut config.aggregator;
        for source in SignalSource::ALL {
            let var = format!("WEIGHT_{}", source.as_str().to_uppercase());
            if std::env::var(&var).is_ok() {
                let current = agg.weight_of(source);
                let weight = env_override(&var, current, |v: &f64| *v > 0.0 && *v <= 1.0);
                agg.source_weights.insert(source, weight);
            }
        }
        agg.default_weight =
            env_override("WEIGHT_DEFAULT", agg.default_weight, |v: &f64| *v > 0.0 && *v <= 1.0);
        agg.min_confidence_threshold = env_override(
            "MIN_CONFIDENCE_THRESHOLD",
            agg.min_confidence_threshold,
            unit_interval,
        );
        agg.max_composite_confidence = env_override(
            "MAX_COMPOSITE_CONFIDENCE",
            agg.max_composite_confidence,
            unit_interval,
        );

        let risk = &mut config.risk;
        risk.max_heat_pct = env_override("MAX_PORTFOLIO_HEAT_PCT", risk.max_heat_pct, percentage);
        risk.max_position_size_pct =
            env_override("MAX_POSITION_SIZE_PCT", risk.max_position_size_pct, percentage);
        risk.volatility_threshold =
            env_override("VOLATILITY_THRESHOLD", risk.volatility_threshold, |v: &f64| *v > 0.0);
        risk.volatility_multiplier = env_override(
            "VOLATILITY_MULTIPLIER",
            risk.volatility_multiplier,
            |v: &f64| (1.0..=5.0).contains(v),
        );

        let priority = &mut config.priority;
        priority.max_companies_per_batch = env_override(
            "MAX_COMPANIES_PER_BATCH",
            priority.max_companies_per_batch,
            |v: &usize| (1..=1000).contains(v),
        );
        priority.min_fundamental_score = env_override(
            "MIN_FUNDAMENTAL_SCORE",
            priority.min_fundamental_score,
            |v: &f64| (0.0..=100.0).contains(v),
        );
        let weights = &mut priority.weights;
        weights.fundamental =
            env_override("PRIORITY_WEIGHT_FUNDAMENTAL", weights.fundamental, unit_interval);
        weights.event = env_override("PRIORITY_WEIGHT_EVENT", weights.event, unit_interval);
        weights.market_cap =
            env_override("PRIORITY_WEIGHT_MARKET_CAP", weights.market_cap, unit_interval);
        weights.freshness =
            env_override("PRIORITY_WEIGHT_FRESHNESS", weights.freshness, unit_interval);
        if let Ok(list) = std::env::var("WATCHLIST") {
            priority.watchlist = list
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config.collectors.min_history_points = env_override(
            "MIN_HISTORY_POINTS",
            config.collectors.min_history_points,
            |v: &usize| *v >= 2,
        );

        config.batch_size = env_override("ANALYSIS_BATCH_SIZE", config.batch_size, |v: &usize| {
            (1..=100).contains(v)
        });
        config.cycle_time_budget_seconds = env_override(
            "CYCLE_TIME_BUDGET_SECONDS",
            config.cycle_time_budget_seconds,
            |v: &u64| (1..=86_400).contains(v),
        );
        config.cache_ttl_seconds = env_override(
            "RESULT_CACHE_TTL_SECONDS",
            config.cache_ttl_seconds,
            |v: &u64| (1..=3600).contains(v),
        );
        config.cache_capacity =
            env_override("RESULT_CACHE_CAPACITY", config.cache_capacity, |v: &usize| *v > 0);
        config.lookups_per_minute = env_override(
            "LOOKUPS_PER_MINUTE",
            config.lookups_per_minute,
            |v: &u32| *v > 0,
        );
        if let Ok(enabled) = std::env::var("NOTIFY_HIGH_URGENCY") {
            config.notify_high_urgency = enabled.to_lowercase() == "true" || enabled == "1";
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (source, weight) in &self.aggregator.source_weights {
            if !(*weight > 0.0) {
                return Err(ConfigError::NonPositiveWeight {
                    source_name: source.to_string(),
                    weight: *weight,
                });
            }
        }
        if !(self.aggregator.default_weight > 0.0) {
            return Err(ConfigError::NonPositiveWeight {
                source_name: "default".to_string(),
                weight: self.aggregator.default_weight,
            });
        }
        if !unit_interval(&self.aggregator.min_confidence_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "min_confidence_threshold",
                value: self.aggregator.min_confidence_threshold.to_string(),
                expected: "[0, 1]",
            });
        }
        if !unit_interval(&self.aggregator.max_composite_confidence) {
            return Err(ConfigError::OutOfRange {
                field: "max_composite_confidence",
                value: self.aggregator.max_composite_confidence.to_string(),
                expected: "[0, 1]",
            });
        }
        if !percentage(&self.risk.max_heat_pct) {
            return Err(ConfigError::OutOfRange {
                field: "max_heat_pct",
                value: self.risk.max_heat_pct.to_string(),
                expected: "(0, 100]",
            });
        }
        if self.risk.low_confidence > self.risk.high_confidence {
            return Err(ConfigError::OutOfRange {
                field: "low_confidence",
                value: self.risk.low_confidence.to_string(),
                expected: "<= high_confidence",
            });
        }
        if self.priority.max_companies_per_batch == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_companies_per_batch",
                value: "0".to_string(),
                expected: ">= 1",
            });
        }
        for (field, value) in self.priority.weights.fields() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value.to_string(),
                    expected: ">= 0",
                });
            }
        }
        if self.batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "batch_size",
                value: "0".to_string(),
                expected: ">= 1",
            });
        }
        if self.cache_ttl_seconds == 0 || self.cache_ttl_seconds > 3600 {
            return Err(ConfigError::OutOfRange {
                field: "cache_ttl_seconds",
                value: self.cache_ttl_seconds.to_string(),
                expected: "[1, 3600]",
            });
        }
        if self.lookups_per_minute == 0 {
            return Err(ConfigError::OutOfRange {
                field: "lookups_per_minute",
                value: "0".to_string(),
                expected: ">= 1",
            });
        }
        Ok(())
    }

    pub fn cycle_time_budget(&self) -> Duration {
        Duration::from_secs(self.cycle_time_budget_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}
