use std::sync::Arc;

use async_trait::async_trait;

use super::{CollectionContext, SignalCollector};
use crate::domain::entities::{SignalAction, SignalCandidate, SignalSource};
use crate::domain::errors::EngineError;
use crate::domain::repositories::FundamentalStore;

const REVENUE_BEAT_PCT: f64 = 15.0;
const REVENUE_STRONG_BEAT_PCT: f64 = 20.0;
const REVENUE_MISS_PCT: f64 = -10.0;
const EPS_BEAT_PCT: f64 = 20.0;

/// Reported results against consensus estimates
pub struct EarningsCollector {
    store: Arc<dyn FundamentalStore>,
}

impl EarningsCollector {
    pub fn new(store: Arc<dyn FundamentalStore>) -> Self {
        EarningsCollector { store }
    }
}

#[async_trait]
impl SignalCollector for EarningsCollector {
    fn source(&self) -> SignalSource {
        SignalSource::Earnings
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<Vec<SignalCandidate>, EngineError> {
        let Some(surprise) = self.store.get_earnings_surprise(&ctx.entity).await? else {
            return Ok(Vec::new());
        };
        let mut signals = Vec::new();

        if let Some(revenue) = surprise.revenue_surprise_pct {
            if revenue >= REVENUE_BEAT_PCT {
                let magnitude = if revenue >= REVENUE_STRONG_BEAT_PCT {
                    "strong"
                } else {
                    "moderate"
                };
                signals.push(
                    SignalCandidate::new(
                        ctx.entity.as_str(),
                        SignalAction::Buy,
                        0.8,
                        SignalSource::Earnings,
                        format!("Revenue beat estimates by {:.1}%", revenue),
                        ctx.as_of,
                    )
                    .with_metadata("signal_type", "earnings_beat")
                    .with_metadata("surprise_magnitude", magnitude),
                );
            } else if revenue <= REVENUE_MISS_PCT {
                signals.push(
                    SignalCandidate::new(
                        ctx.entity.as_str(),
                        SignalAction::Sell,
                        0.7,
                        SignalSource::Earnings,
                        format!("Revenue missed estimates by {:.1}%", revenue.abs()),
                        ctx.as_of,
                    )
                    .with_metadata("signal_type", "earnings_miss"),
                );
            }
        }

        if let Some(eps) = surprise.eps_surprise_pct {
            if eps >= EPS_BEAT_PCT {
                signals.push(
                    SignalCandidate::new(
                        ctx.entity.as_str(),
                        SignalAction::Buy,
                        0.75,
                        SignalSource::Earnings,
                        format!("EPS beat estimates by {:.1}%", eps),
                        ctx.as_of,
                    )
                    .with_metadata("signal_type", "eps_beat"),
                );
            }
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::EarningsSurprise;
    use crate::infrastructure::snapshot::{MarketSnapshot, SnapshotStore};
    use chrono::Utc;

    async fn run(surprise: EarningsSurprise) -> Vec<SignalCandidate> {
        let mut snapshot = MarketSnapshot::default();
        snapshot.entity_mut("ITC").earnings = Some(surprise);
        let collector = EarningsCollector::new(Arc::new(SnapshotStore::new(snapshot)));
        collector
            .collect(&CollectionContext::new("ITC", Utc::now()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_revenue_and_eps_beat() {
        let signals = run(EarningsSurprise {
            revenue_surprise_pct: Some(16.0),
            eps_surprise_pct: Some(25.0),
        })
        .await;
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].confidence.value(), 0.8);
        assert_eq!(signals[0].metadata["surprise_magnitude"], "moderate");
        assert_eq!(signals[1].confidence.value(), 0.75);
    }

    #[tokio::test]
    async fn test_revenue_miss_sells() {
        let signals = run(EarningsSurprise {
            revenue_surprise_pct: Some(-12.0),
            eps_surprise_pct: Some(5.0),
        })
        .await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, SignalAction::Sell);
        assert_eq!(signals[0].confidence.value(), 0.7);
    }

    #[tokio::test]
    async fn test_small_surprise_ignored() {
        let signals = run(EarningsSurprise {
            revenue_surprise_pct: Some(5.0),
            eps_surprise_pct: None,
        })
        .await;
        assert!(signals.is_empty());
    }
}
