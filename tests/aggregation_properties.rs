use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use signal_fusion::config::{AggregatorConfig, PriorityConfig};
use signal_fusion::domain::entities::{FundamentalScore, SignalAction, SignalCandidate, SignalSource};
use signal_fusion::domain::services::{PriorityScorer, SignalAggregator};
use signal_fusion::infrastructure::{MarketSnapshot, SnapshotStore};

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap() + Duration::minutes(minute)
}

fn candidate(action: SignalAction, confidence: f64, source: SignalSource, minute: i64) -> SignalCandidate {
    SignalCandidate::new(
        "RELIANCE",
        action,
        confidence,
        source,
        format!("{} {} at {:.2}", source, action, confidence),
        at(minute),
    )
}

fn mixed_candidates() -> Vec<SignalCandidate> {
    vec![
        candidate(SignalAction::Buy, 0.82, SignalSource::Fundamental, 0),
        candidate(SignalAction::Buy, 0.55, SignalSource::Technical, 1),
        candidate(SignalAction::Sell, 0.7, SignalSource::Earnings, 2),
        candidate(SignalAction::Buy, 0.7, SignalSource::Event, 3).with_source(SignalSource::Order),
        candidate(SignalAction::Hold, 0.5, SignalSource::Momentum, 4),
    ]
}

/// Every ordering reachable by rotating and reversing the input
fn orderings(candidates: &[SignalCandidate]) -> Vec<Vec<SignalCandidate>> {
    let mut all = Vec::new();
    for shift in 0..candidates.len() {
        let mut rotated = candidates.to_vec();
        rotated.rotate_left(shift);
        let mut reversed = rotated.clone();
        reversed.reverse();
        all.push(rotated);
        all.push(reversed);
    }
    all
}

#[test]
fn test_aggregate_is_order_independent() {
    let aggregator = SignalAggregator::new(AggregatorConfig::default());
    let candidates = mixed_candidates();
    let expected = aggregator.aggregate("RELIANCE", &candidates).unwrap();
    assert!(expected.is_some());

    for ordering in orderings(&candidates) {
        assert_eq!(aggregator.aggregate("RELIANCE", &ordering).unwrap(), expected);
    }
}

#[test]
fn test_aggregate_is_idempotent() {
    let aggregator = SignalAggregator::new(AggregatorConfig::default());
    let candidates = mixed_candidates();
    let first = aggregator.aggregate("RELIANCE", &candidates).unwrap();
    let second = aggregator.aggregate("RELIANCE", &candidates).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_emitted_confidence_never_exceeds_cap() {
    let aggregator = SignalAggregator::new(AggregatorConfig::default());
    for step in 0..=20 {
        let confidence = step as f64 * 0.05;
        let candidates = vec![
            candidate(SignalAction::StrongBuy, confidence, SignalSource::Fundamental, 0),
            candidate(SignalAction::Buy, 1.0, SignalSource::Earnings, 1),
        ];
        if let Some(composite) = aggregator.aggregate("RELIANCE", &candidates).unwrap() {
            assert!(composite.confidence.value() <= 0.95);
            assert!(composite.confidence.value() >= 0.6);
        }
    }
}

#[test]
fn test_reference_cases() {
    let aggregator = SignalAggregator::new(AggregatorConfig::default());

    let composite = aggregator
        .aggregate(
            "RELIANCE",
            &[
                candidate(SignalAction::Buy, 0.8, SignalSource::Fundamental, 0),
                candidate(SignalAction::Buy, 0.7, SignalSource::Technical, 1),
            ],
        )
        .unwrap()
        .unwrap();
    assert_eq!(composite.action, SignalAction::Buy);
    assert!((composite.confidence.value() - 0.53 / 0.7).abs() < 1e-9);

    let weak_sell = [candidate(SignalAction::Sell, 0.5, SignalSource::Event, 0)];
    assert!(aggregator.aggregate("RELIANCE", &weak_sell).unwrap().is_none());

    assert!(aggregator.aggregate("RELIANCE", &[]).unwrap().is_none());

    let tie = [
        candidate(SignalAction::Buy, 0.65, SignalSource::Technical, 0),
        candidate(SignalAction::Sell, 0.65, SignalSource::Technical, 1),
    ];
    assert!(aggregator.aggregate("RELIANCE", &tie).unwrap().is_none());
}

#[tokio::test]
async fn test_priority_list_respects_budget_for_any_universe() {
    for size in [0usize, 10, 49, 50, 51, 300] {
        let mut snapshot = MarketSnapshot::default();
        let mut config = PriorityConfig::default();
        let universe: Vec<String> = (0..size).map(|i| format!("S{:04}", i)).collect();
        for (i, entity) in universe.iter().enumerate() {
            snapshot.entity_mut(entity).score = Some(FundamentalScore {
                overall_score: (i % 100) as f64,
                valuation_score: 85.0,
                profitability_score: 50.0,
                growth_score: 50.0,
                financial_health_score: None,
                updated_at: at(0),
            });
        }
        config.watchlist = universe.clone();
        let store = Arc::new(SnapshotStore::new(snapshot));
        let scorer = PriorityScorer::new(store.clone(), store, config);

        let selected = scorer.select(&universe, 50, at(0)).await;

        assert_eq!(selected.len(), size.min(50));
        for score in &selected {
            assert!((0.0..=100.0).contains(&score.score));
        }
    }
}
