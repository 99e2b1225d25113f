use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use super::{CollectionContext, SignalCollector};
use crate::config::CollectorConfig;
use crate::domain::entities::{
    CorporateEvent, EventType, ImpactLevel, SignalAction, SignalCandidate, SignalSource,
};
use crate::domain::errors::EngineError;
use crate::domain::repositories::{EventStore, EventWindow};

const POSITIVE_RESULT_PHRASES: [&str; 8] = [
    "profit growth",
    "revenue growth",
    "beat estimates",
    "strong performance",
    "record profit",
    "record revenue",
    "exceeded expectations",
    "positive outlook",
];

const NEGATIVE_RESULT_PHRASES: [&str; 7] = [
    "loss",
    "decline",
    "below estimates",
    "disappointing",
    "weak performance",
    "reduced guidance",
    "challenges",
];

const RESULTS_DISCOUNT: f64 = 0.8;
const RESULTS_FLOOR: f64 = 0.5;

fn impact_confidence(impact: ImpactLevel) -> f64 {
    match impact {
        ImpactLevel::High => 0.7,
        _ => 0.5,
    }
}

/// Keyword vote over the announcement text
pub fn results_look_positive(event: &CorporateEvent) -> bool {
    let text = format!("{} {}", event.title, event.description).to_lowercase();
    let positive = POSITIVE_RESULT_PHRASES
        .iter()
        .filter(|p| text.contains(**p))
        .count();
    let negative = NEGATIVE_RESULT_PHRASES
        .iter()
        .filter(|p| text.contains(**p))
        .count();
    positive > negative
}

/// Recent significant corporate events
pub struct EventCollector {
    store: Arc<dyn EventStore>,
    config: CollectorConfig,
}

impl EventCollector {
    pub fn new(store: Arc<dyn EventStore>, config: CollectorConfig) -> Self {
        EventCollector { store, config }
    }
}

#[async_trait]
impl SignalCollector for EventCollector {
    fn source(&self) -> SignalSource {
        SignalSource::Event
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<Vec<SignalCandidate>, EngineError> {
        let window = EventWindow::trailing(ctx.as_of, Duration::days(self.config.event_lookback_days));
        let events = self.store.get_recent_events(&ctx.entity, window).await?;

        let signals = events
            .iter()
            .filter(|e| e.impact.is_significant())
            .take(self.config.max_events_considered)
            .filter_map(|event| {
                let base = impact_confidence(event.impact);
                let (confidence, reason, signal_type) = match event.event_type {
                    EventType::OrderReceived => (
                        base,
                        format!("Major order announcement: {}", event.title),
                        "order_announcement",
                    ),
                    EventType::ResultsAnnouncement if results_look_positive(event) => (
                        (base * RESULTS_DISCOUNT).max(RESULTS_FLOOR),
                        format!("Positive results announcement: {}", event.title),
                        "positive_results",
                    ),
                    _ => return None,
                };
                Some(
                    SignalCandidate::new(
                        ctx.entity.as_str(),
                        SignalAction::Buy,
                        confidence,
                        SignalSource::Event,
                        reason,
                        ctx.as_of,
                    )
                    .with_metadata("signal_type", signal_type)
                    .with_metadata("event_id", event.id.as_str())
                    .with_metadata("event_date", event.announced_at.to_rfc3339()),
                )
            })
            .collect();

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::snapshot::{MarketSnapshot, SnapshotStore, StorePort};
    use chrono::{DateTime, Utc};

    fn event(
        id: &str,
        kind: EventType,
        impact: ImpactLevel,
        title: &str,
        at: DateTime<Utc>,
    ) -> CorporateEvent {
        CorporateEvent {
            id: id.to_string(),
            entity: "LT".to_string(),
            event_type: kind,
            impact,
            title: title.to_string(),
            description: String::new(),
            announced_at: at,
            order_value: None,
            processed: false,
        }
    }

    async fn run(events: Vec<CorporateEvent>) -> Vec<SignalCandidate> {
        let snapshot = MarketSnapshot {
            events,
            ..Default::default()
        };
        let collector = EventCollector::new(
            Arc::new(SnapshotStore::new(snapshot)),
            CollectorConfig::default(),
        );
        collector
            .collect(&CollectionContext::new("LT", Utc::now()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_events_scaled_by_impact() {
        let now = Utc::now();
        let signals = run(vec![
            event("a", EventType::OrderReceived, ImpactLevel::High, "Metro", now - Duration::hours(2)),
            event("b", EventType::OrderReceived, ImpactLevel::Medium, "Road", now - Duration::days(1)),
            event("c", EventType::OrderReceived, ImpactLevel::Low, "Tiny", now - Duration::hours(1)),
        ])
        .await;
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].confidence.value(), 0.7);
        assert_eq!(signals[1].confidence.value(), 0.5);
        assert!(signals.iter().all(|s| s.action == SignalAction::Buy));
    }

    #[tokio::test]
    async fn test_only_three_most_recent_significant_events() {
        let now = Utc::now();
        let events = (0..5)
            .map(|i| {
                event(
                    &format!("e{}", i),
                    EventType::OrderReceived,
                    ImpactLevel::High,
                    "Order",
                    now - Duration::hours(i),
                )
            })
            .collect();
        let signals = run(events).await;
        let ids: Vec<&str> = signals
            .iter()
            .map(|s| s.metadata["event_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["e0", "e1", "e2"]);
    }

    #[tokio::test]
    async fn test_results_sentiment() {
        let now = Utc::now();
        let signals = run(vec![
            event(
                "good",
                EventType::ResultsAnnouncement,
                ImpactLevel::High,
                "Record profit, beat estimates",
                now,
            ),
            event(
                "bad",
                EventType::ResultsAnnouncement,
                ImpactLevel::High,
                "Disappointing quarter, revenue decline",
                now - Duration::hours(1),
            ),
        ])
        .await;
        assert_eq!(signals.len(), 1);
        assert!((signals[0].confidence.value() - 0.56).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_medium_results_floored() {
        let signals = run(vec![event(
            "m",
            EventType::ResultsAnnouncement,
            ImpactLevel::Medium,
            "Strong performance with revenue growth",
            Utc::now(),
        )])
        .await;
        assert_eq!(signals[0].confidence.value(), 0.5);
    }

    #[tokio::test]
    async fn test_old_events_ignored() {
        let old = Utc::now() - Duration::days(9);
        let signals = run(vec![event("o", EventType::OrderReceived, ImpactLevel::High, "Old", old)]).await;
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let store = SnapshotStore::new(MarketSnapshot::default()).with_outage(StorePort::Events);
        let collector = EventCollector::new(Arc::new(store), CollectorConfig::default());
        assert!(collector
            .collect(&CollectionContext::new("LT", Utc::now()))
            .await
            .is_err());
    }
}
