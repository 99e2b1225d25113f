use std::sync::Arc;

use async_trait::async_trait;

use super::{CollectionContext, SignalCollector};
use crate::domain::entities::{SignalAction, SignalCandidate, SignalSource};
use crate::domain::errors::EngineError;
use crate::domain::repositories::FundamentalStore;

const STRONG_VALUE: f64 = 80.0;
const WEAK_VALUE: f64 = 30.0;
const STRONG_GROWTH: f64 = 75.0;
const STRONG_HEALTH: f64 = 80.0;
const STRONG_PROFITABILITY: f64 = 75.0;

/// Scores and valuation from the fundamental store
pub struct FundamentalCollector {
    store: Arc<dyn FundamentalStore>,
}

impl FundamentalCollector {
    pub fn new(store: Arc<dyn FundamentalStore>) -> Self {
        FundamentalCollector { store }
    }
}

#[async_trait]
impl SignalCollector for FundamentalCollector {
    fn source(&self) -> SignalSource {
        SignalSource::Fundamental
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<Vec<SignalCandidate>, EngineError> {
        let entity = ctx.entity.as_str();
        let score = self.store.get_score(entity).await?;
        let valuation = self.store.get_valuation(entity).await?;
        let candidate = |action, confidence, reason: String, signal_type: &str| {
            SignalCandidate::new(
                entity,
                action,
                confidence,
                SignalSource::Fundamental,
                reason,
                ctx.as_of,
            )
            .with_metadata("signal_type", signal_type)
        };

        let mut signals = Vec::new();
        let value_score = valuation.as_ref().and_then(|v| v.value_score);

        if let Some(value) = value_score {
            if value >= STRONG_VALUE {
                let mut c = candidate(
                    SignalAction::Buy,
                    (value / 100.0).min(0.9),
                    format!("Strong fundamental value score: {:.1}/100", value),
                    "fundamental_value",
                );
                if let Some(v) = valuation.as_ref() {
                    if let Some(pe) = v.pe_score {
                        c = c.with_metadata("pe_score", pe);
                    }
                    if let Some(pb) = v.pb_score {
                        c = c.with_metadata("pb_score", pb);
                    }
                }
                signals.push(c);
            } else if value <= WEAK_VALUE {
                signals.push(candidate(
                    SignalAction::Sell,
                    ((100.0 - value) / 100.0).min(0.8),
                    format!("Weak fundamental value score: {:.1}/100", value),
                    "fundamental_weakness",
                ));
            }
        }

        let Some(score) = score else {
            return Ok(signals);
        };

        if score.growth_score >= STRONG_GROWTH {
            signals.push(candidate(
                SignalAction::Buy,
                (score.growth_score / 100.0).min(0.85),
                format!("Strong growth prospects: {:.1}/100", score.growth_score),
                "growth_momentum",
            ));
        }

        if let Some(health) = score.financial_health_score {
            if health >= STRONG_HEALTH {
                signals.push(candidate(
                    SignalAction::Buy,
                    0.7,
                    format!("Excellent financial health: {:.1}/100", health),
                    "financial_strength",
                ));
            }
        }

        if score.profitability_score >= STRONG_PROFITABILITY {
            signals.push(candidate(
                SignalAction::Buy,
                0.6,
                format!("Strong profitability: {:.1}/100", score.profitability_score),
                "profitability_strength",
            ));
        }

        if value_score.is_none() && score.overall_score <= WEAK_VALUE {
            signals.push(candidate(
                SignalAction::Avoid,
                (100.0 - score.overall_score) / 100.0,
                format!("Weak overall fundamentals: {:.1}/100", score.overall_score),
                "fundamental_avoid",
            ));
        }

        Ok(signals)
    }
}
