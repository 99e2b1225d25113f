use std::sync::Arc;

use async_trait::async_trait;

use super::{CollectionContext, SignalCollector};
use crate::domain::entities::{MomentumTrend, SignalAction, SignalCandidate, SignalSource};
use crate::domain::errors::EngineError;
use crate::domain::repositories::FundamentalStore;

const STRONG_MOMENTUM_SCORE: f64 = 70.0;

/// Quarter-over-quarter revenue and profit momentum
pub struct MomentumCollector {
    store: Arc<dyn FundamentalStore>,
}

impl MomentumCollector {
    pub fn new(store: Arc<dyn FundamentalStore>) -> Self {
        MomentumCollector { store }
    }
}

#[async_trait]
impl SignalCollector for MomentumCollector {
    fn source(&self) -> SignalSource {
        SignalSource::Momentum
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<Vec<SignalCandidate>, EngineError> {
        let Some(growth) = self.store.get_growth(&ctx.entity).await? else {
            return Ok(Vec::new());
        };
        let mut signals = Vec::new();

        if let Some(score) = growth.momentum_score {
            if score >= STRONG_MOMENTUM_SCORE {
                signals.push(
                    SignalCandidate::new(
                        ctx.entity.as_str(),
                        SignalAction::Buy,
                        0.6,
                        SignalSource::Momentum,
                        format!("Strong quarterly momentum: {:.1}/100", score),
                        ctx.as_of,
                    )
                    .with_metadata("signal_type", "quarterly_momentum"),
                );
            }
        }

        let profit_keeps_up = matches!(
            growth.profit_momentum,
            MomentumTrend::Strong | MomentumTrend::Moderate
        );
        if growth.revenue_momentum == MomentumTrend::Strong && profit_keeps_up {
            let profit = if growth.profit_momentum == MomentumTrend::Strong {
                "strong"
            } else {
                "moderate"
            };
            signals.push(
                SignalCandidate::new(
                    ctx.entity.as_str(),
                    SignalAction::Buy,
                    0.65,
                    SignalSource::Momentum,
                    format!("Strong revenue momentum with {} profit growth", profit),
                    ctx.as_of,
                )
                .with_metadata("signal_type", "revenue_profit_momentum"),
            );
        }

        Ok(signals)
    }
}
