use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::AggregatorConfig;
use crate::domain::entities::{
    CompositeSignal, RiskLevel, SignalAction, SignalCandidate, SignalSource, TimeHorizon, Urgency,
};
use crate::domain::errors::EngineError;
use crate::domain::value_objects::Confidence;

/// Total order over candidates so every reduction sees the same sequence
fn canonical_order(a: &SignalCandidate, b: &SignalCandidate) -> Ordering {
    a.action
        .cmp(&b.action)
        .then_with(|| a.sources.cmp(&b.sources))
        .then_with(|| a.confidence.value().total_cmp(&b.confidence.value()))
        .then_with(|| a.reason.cmp(&b.reason))
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

/// Fuses the candidates of one entity into at most one composite
///
/// The result depends only on the multiset of candidates: input order is
/// irrelevant and repeated calls return identical output.
pub struct SignalAggregator {
    config: AggregatorConfig,
}

impl SignalAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        SignalAggregator { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Mean of the weights of the declared sources
    pub fn candidate_weight(&self, candidate: &SignalCandidate) -> f64 {
        if candidate.sources.is_empty() {
            return self.config.default_weight;
        }
        let total: f64 = candidate
            .sources
            .iter()
            .map(|s| self.config.weight_of(*s))
            .sum();
        total / candidate.sources.len() as f64
    }

    /// Weighted mean confidence, 0 for an empty group
    pub fn weighted_score(&self, group: &[&SignalCandidate]) -> f64 {
        let (weighted, total) = group.iter().fold((0.0, 0.0), |(weighted, total), c| {
            let w = self.candidate_weight(c);
            (weighted + c.confidence.value() * w, total + w)
        });
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    fn time_horizon(&self, group: &[&SignalCandidate]) -> TimeHorizon {
        let mut short = 0.0;
        let mut long = 0.0;
        let mut total = 0.0;
        for c in group {
            let share = self.candidate_weight(c) / c.sources.len().max(1) as f64;
            for source in &c.sources {
                match source {
                    SignalSource::Technical | SignalSource::Event | SignalSource::Order => {
                        short += share
                    }
                    SignalSource::Fundamental => long += share,
                    SignalSource::Momentum | SignalSource::Earnings => {}
                }
                total += share;
            }
        }
        if total <= 0.0 {
            TimeHorizon::MediumTerm
        } else if short > total / 2.0 {
            TimeHorizon::ShortTerm
        } else if long > total / 2.0 {
            TimeHorizon::LongTerm
        } else {
            TimeHorizon::MediumTerm
        }
    }

    fn summary_line(&self, reasons: &[String]) -> String {
        let shown = self.config.max_listed_reasons;
        let mut line = format!(
            "Composite signal ({} factors): {}",
            reasons.len(),
            reasons.iter().take(shown).cloned().collect::<Vec<_>>().join("; ")
        );
        if reasons.len() > shown {
            line.push_str(&format!(" + {} more factors", reasons.len() - shown));
        }
        line
    }

    /// # Returns
    /// `Ok(None)` when there is nothing to act on: no candidates, a tie, or
    /// both directions below the confidence threshold
    pub fn aggregate(
        &self,
        entity: &str,
        candidates: &[SignalCandidate],
    ) -> Result<Option<CompositeSignal>, EngineError> {
        let mut ordered: Vec<&SignalCandidate> = candidates
            .iter()
            .filter(|c| {
                let own = c.entity == entity;
                if !own {
                    warn!(entity = %entity, other = %c.entity, "Ignoring candidate for another entity");
                }
                own
            })
            .collect();
        if ordered.is_empty() {
            return Ok(None);
        }
        ordered.sort_by(|a, b| canonical_order(a, b));

        let buy_group: Vec<&SignalCandidate> =
            ordered.iter().copied().filter(|c| c.action.is_bullish()).collect();
        let sell_group: Vec<&SignalCandidate> =
            ordered.iter().copied().filter(|c| c.action.is_bearish()).collect();
        let neutral: Vec<&SignalCandidate> = ordered
            .iter()
            .copied()
            .filter(|c| !c.action.is_bullish() && !c.action.is_bearish())
            .collect();

        let buy_score = self.weighted_score(&buy_group);
        let sell_score = self.weighted_score(&sell_group);
        if !buy_score.is_finite() || !sell_score.is_finite() {
            return Err(EngineError::AggregationFailed {
                entity: entity.to_string(),
                reason: format!("non-finite score (buy={}, sell={})", buy_score, sell_score),
            });
        }

        let threshold = self.config.min_confidence_threshold;
        if buy_score == sell_score || (buy_score < threshold && sell_score < threshold) {
            debug!(
                entity = %entity,
                buy_score = buy_score,
                sell_score = sell_score,
                "No actionable composite"
            );
            return Ok(None);
        }

        let (action, score, winners) = if buy_score > sell_score {
            (SignalAction::Buy, buy_score, &buy_group)
        } else {
            (SignalAction::Sell, sell_score, &sell_group)
        };

        let mut reasons: Vec<String> = winners.iter().map(|c| c.reason.clone()).collect();
        reasons.sort();
        let reason = self.summary_line(&reasons);
        let mut context: Vec<String> = neutral
            .iter()
            .map(|c| format!("{} noted: {}", c.action, c.reason))
            .collect();
        context.sort();
        reasons.extend(context);

        let contributing_sources: BTreeSet<SignalSource> = winners
            .iter()
            .flat_map(|c| c.sources.iter().copied())
            .collect();
        let event_corroboration = winners
            .iter()
            .filter(|c| c.sources.contains(&SignalSource::Event))
            .count();
        let generated_at = ordered
            .iter()
            .map(|c| c.timestamp)
            .max()
            .ok_or_else(|| EngineError::AggregationFailed {
                entity: entity.to_string(),
                reason: "no timestamps".to_string(),
            })?;

        let composite = CompositeSignal {
            entity: entity.to_string(),
            action,
            confidence: Confidence::clamped(score).capped_at(self.config.max_composite_confidence),
            contributing_sources,
            reason,
            reasons,
            risk_level: RiskLevel::Medium,
            position_size_pct: 0.0,
            reference_price: None,
            stop_loss: None,
            target_price: None,
            urgency: Urgency::Low,
            time_horizon: self.time_horizon(winners),
            buy_score,
            sell_score,
            component_count: ordered.len(),
            event_corroboration,
            generated_at,
        };

        debug!(
            entity = %entity,
            action = %composite.action,
            confidence = composite.confidence.value(),
            buy_score = buy_score,
            sell_score = sell_score,
            components = composite.component_count,
            "Composite signal built"
        );
        Ok(Some(composite))
    }
}
