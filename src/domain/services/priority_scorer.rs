use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::config::{PriorityConfig, PriorityWeights};
use crate::domain::entities::{
    CorporateEvent, EventType, FundamentalScore, MarketCapTier, PriorityCategory, PriorityScore,
};
use crate::domain::repositories::{EventStore, EventWindow, FundamentalStore};

fn market_cap_bonus(tier: Option<MarketCapTier>, weights: &PriorityWeights) -> f64 {
    match tier {
        Some(MarketCapTier::Large) => weights.large_cap_bonus,
        Some(MarketCapTier::Mid) => weights.mid_cap_bonus,
        Some(MarketCapTier::Small) => weights.small_cap_bonus,
        None => 0.0,
    }
}

/// Entity found by at least one discovery source
#[derive(Debug, Clone, PartialEq)]
struct Discovered {
    entity: String,
    category: PriorityCategory,
    reasons: Vec<String>,
}

/// Discovery results in first-seen order
#[derive(Default)]
struct DiscoverySet {
    entries: Vec<Discovered>,
    index: BTreeMap<String, usize>,
}

impl DiscoverySet {
    fn add(&mut self, entity: &str, category: PriorityCategory, reason: String) {
        match self.index.get(entity) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.category = entry.category.min(category);
                if !entry.reasons.contains(&reason) {
                    entry.reasons.push(reason);
                }
            }
            None => {
                self.index.insert(entity.to_string(), self.entries.len());
                self.entries.push(Discovered {
                    entity: entity.to_string(),
                    category,
                    reasons: vec![reason],
                });
            }
        }
    }
}

/// Selects the bounded working set of entities for one cycle
pub struct PriorityScorer {
    fundamentals: Arc<dyn FundamentalStore>,
    events: Arc<dyn EventStore>,
    config: PriorityConfig,
}

impl PriorityScorer {
    pub fn new(
        fundamentals: Arc<dyn FundamentalStore>,
        events: Arc<dyn EventStore>,
        config: PriorityConfig,
    ) -> Self {
        PriorityScorer {
            fundamentals,
            events,
            config,
        }
    }

    /// Pick at most `budget` entities out of `universe`
    ///
    /// When discovery finds no more than `budget` entities they are returned in
    /// discovery order with a zero score. Otherwise every discovered entity is
    /// scored and the top `budget` are kept, ties resolved by discovery order.
    pub async fn select(
        &self,
        universe: &[String],
        budget: usize,
        as_of: DateTime<Utc>,
    ) -> Vec<PriorityScore> {
        let universe: BTreeSet<&str> = universe.iter().map(String::as_str).collect();
        let recent_events = self.fetch_recent_events(as_of).await;
        let fundamentals = self.fetch_scores(&universe).await;
        let discovered = self
            .discover(&universe, &recent_events, &fundamentals, as_of)
            .await;

        let discovered_count = discovered.len();
        if discovered_count <= budget {
            info!(
                discovered = discovered_count,
                budget = budget,
                "Discovery within budget, skipping ranking"
            );
            return discovered
                .into_iter()
                .map(|d| PriorityScore::new(d.entity, 0.0, d.reasons, d.category))
                .collect();
        }

        let event_counts = significant_event_counts(
            &recent_events,
            EventWindow::trailing(as_of, Duration::days(self.config.event_lookback_days)),
        );

        let scores = join_all(discovered.iter().map(|d| {
            let count = event_counts.get(d.entity.as_str()).copied().unwrap_or(0);
            self.score_entity(&d.entity, fundamentals.get(d.entity.as_str()), count, as_of)
        }))
        .await;

        let mut ranked: Vec<PriorityScore> = discovered
            .into_iter()
            .zip(scores)
            .map(|(d, score)| PriorityScore::new(d.entity, score, d.reasons, d.category))
            .collect();
        // Stable sort keeps discovery order among equal scores.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(budget);

        info!(
            discovered = discovered_count,
            selected = ranked.len(),
            top_score = ranked.first().map(|p| p.score).unwrap_or(0.0),
            "Priority ranking completed"
        );
        ranked
    }

    /// Every event inside the widest trailing window any source needs
    async fn fetch_recent_events(&self, as_of: DateTime<Utc>) -> Vec<CorporateEvent> {
        let widest = self
            .config
            .event_lookback_days
            .max(self.config.results_lookback_days)
            .max(self.config.order_lookback_days);
        match self
            .events
            .get_events_in(EventWindow::trailing(as_of, Duration::days(widest)))
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Event store unavailable, event-based discovery skipped");
                Vec::new()
            }
        }
    }

    /// One score lookup per entity, shared by discovery and ranking
    async fn fetch_scores(&self, universe: &BTreeSet<&str>) -> BTreeMap<String, FundamentalScore> {
        let lookups = join_all(universe.iter().map(|entity| async move {
            (entity.to_string(), self.fundamentals.get_score(entity).await)
        }))
        .await;

        let mut scores = BTreeMap::new();
        for (entity, result) in lookups {
            match result {
                Ok(Some(score)) => {
                    scores.insert(entity, score);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(entity = %entity, error = %e, "Fundamental lookup failed during discovery")
                }
            }
        }
        scores
    }

    async fn discover(
        &self,
        universe: &BTreeSet<&str>,
        recent_events: &[CorporateEvent],
        fundamentals: &BTreeMap<String, FundamentalScore>,
        as_of: DateTime<Utc>,
    ) -> Vec<Discovered> {
        let mut set = DiscoverySet::default();
        let in_universe = |entity: &str| universe.contains(entity);

        // Event-driven sources first so they own the category of shared entities.
        let event_window =
            EventWindow::trailing(as_of, Duration::days(self.config.event_lookback_days));
        let order_window =
            EventWindow::trailing(as_of, Duration::days(self.config.order_lookback_days));
        let results_window =
            EventWindow::trailing(as_of, Duration::days(self.config.results_lookback_days));

        for event in recent_events.iter().filter(|e| in_universe(e.entity.as_str())) {
            let significant = event.impact.is_significant();
            if significant && event_window.contains(event.announced_at) {
                set.add(
                    &event.entity,
                    PriorityCategory::EventDriven,
                    format!("Recent {:?} impact event: {}", event.impact, event.title),
                );
            }
            if significant
                && event.event_type == EventType::OrderReceived
                && order_window.contains(event.announced_at)
            {
                set.add(
                    &event.entity,
                    PriorityCategory::EventDriven,
                    "Recent order announcement".to_string(),
                );
            }
            if event.event_type == EventType::ResultsAnnouncement
                && results_window.contains(event.announced_at)
            {
                set.add(
                    &event.entity,
                    PriorityCategory::Results,
                    "Recent results announcement".to_string(),
                );
            }
        }

        let upcoming_window =
            EventWindow::ahead(as_of, Duration::days(self.config.upcoming_event_days));
        match self.events.get_upcoming_events(upcoming_window).await {
            Ok(upcoming) => {
                for entity in upcoming.iter().filter(|e| in_universe(e.as_str())) {
                    set.add(
                        entity,
                        PriorityCategory::EventDriven,
                        "Upcoming corporate event".to_string(),
                    );
                }
            }
            Err(e) => warn!(error = %e, "Upcoming-event discovery failed"),
        }

        for (entity, overall) in self.strong_fundamentals(fundamentals) {
            set.add(
                &entity,
                PriorityCategory::Fundamental,
                format!("Strong fundamentals ({:.1}/100)", overall),
            );
        }

        for entity in self.momentum_leaders(universe).await {
            set.add(
                &entity,
                PriorityCategory::Momentum,
                "Revenue and profit growth momentum".to_string(),
            );
        }

        for entity in self.config.watchlist.iter().filter(|e| in_universe(e.as_str())) {
            set.add(entity, PriorityCategory::Watchlist, "Watchlist".to_string());
        }

        debug!(discovered = set.entries.len(), "Discovery completed");
        set.entries
    }

    /// Entities meeting the fundamental bar, best overall score first, capped
    fn strong_fundamentals(
        &self,
        fundamentals: &BTreeMap<String, FundamentalScore>,
    ) -> Vec<(String, f64)> {
        let mut strong: Vec<(String, f64)> = fundamentals
            .iter()
            .filter(|(_, score)| {
                score.overall_score >= self.config.min_fundamental_score
                    || score.valuation_score >= self.config.min_sub_score
                    || score.growth_score >= self.config.min_sub_score
            })
            .map(|(entity, score)| (entity.clone(), score.overall_score))
            .collect();
        strong.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        strong.truncate(self.config.max_fundamental_leaders);
        strong
    }

    async fn momentum_leaders(&self, universe: &BTreeSet<&str>) -> Vec<String> {
        let lookups = join_all(universe.iter().map(|entity| async move {
            (entity.to_string(), self.fundamentals.get_growth(entity).await)
        }))
        .await;

        lookups
            .into_iter()
            .filter_map(|(entity, result)| match result {
                Ok(Some(growth)) => {
                    let revenue = growth.revenue_growth_1y?;
                    let profit = growth.profit_growth_1y?;
                    (revenue >= self.config.min_revenue_growth_pct
                        && profit >= self.config.min_profit_growth_pct)
                        .then_some(entity)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(entity = %entity, error = %e, "Growth lookup failed during discovery");
                    None
                }
            })
            .collect()
    }

    /// Missing or failing records contribute zero
    async fn score_entity(
        &self,
        entity: &str,
        score: Option<&FundamentalScore>,
        event_count: usize,
        as_of: DateTime<Utc>,
    ) -> f64 {
        let weights = &self.config.weights;
        let valuation = self.fundamentals.get_valuation(entity).await.unwrap_or_else(|e| {
            warn!(entity = %entity, error = %e, "Valuation lookup failed, treating as zero");
            None
        });

        let fundamental = score.map(|s| s.overall_score).unwrap_or(0.0);
        let events = (event_count as f64 * weights.points_per_event).min(weights.max_event_points);
        let tier = valuation.and_then(|v| v.market_cap).and_then(|cap| {
            MarketCapTier::classify(
                cap,
                self.config.large_cap_threshold,
                self.config.mid_cap_threshold,
            )
        });
        let fresh = score
            .map(|s| as_of - s.updated_at <= Duration::days(self.config.freshness_days))
            .unwrap_or(false);

        let total = weights.fundamental * fundamental
            + weights.event * events
            + weights.market_cap * market_cap_bonus(tier, weights)
            + weights.freshness * if fresh { weights.freshness_points } else { 0.0 };

        debug!(
            entity = %entity,
            fundamental = fundamental,
            event_count = event_count,
            tier = ?tier,
            fresh = fresh,
            score = total,
            "Priority score computed"
        );
        total
    }
}

fn significant_event_counts(events: &[CorporateEvent], window: EventWindow) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for event in events
        .iter()
        .filter(|e| e.impact.is_significant() && window.contains(e.announced_at))
    {
        *counts.entry(event.entity.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        EarningsSurprise, GrowthSnapshot, ImpactLevel, Urgency, ValuationSnapshot,
    };
    use crate::domain::errors::ProviderError;
    use crate::infrastructure::snapshot::{MarketSnapshot, ScheduledEvent, SnapshotStore, StorePort};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Snapshot store that counts score lookups
    struct CountingStore {
        inner: SnapshotStore,
        score_lookups: AtomicUsize,
    }

    #[async_trait]
    impl FundamentalStore for CountingStore {
        async fn list_entities(&self) -> Result<Vec<String>, ProviderError> {
            self.inner.list_entities().await
        }

        async fn get_score(&self, entity: &str) -> Result<Option<FundamentalScore>, ProviderError> {
            self.score_lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get_score(entity).await
        }

        async fn get_valuation(&self, entity: &str) -> Result<Option<ValuationSnapshot>, ProviderError> {
            self.inner.get_valuation(entity).await
        }

        async fn get_growth(&self, entity: &str) -> Result<Option<GrowthSnapshot>, ProviderError> {
            self.inner.get_growth(entity).await
        }

        async fn get_earnings_surprise(
            &self,
            entity: &str,
        ) -> Result<Option<EarningsSurprise>, ProviderError> {
            self.inner.get_earnings_surprise(entity).await
        }
    }

    fn fundamental(overall: f64, as_of: DateTime<Utc>) -> FundamentalScore {
        FundamentalScore {
            overall_score: overall,
            valuation_score: 50.0,
            profitability_score: 50.0,
            growth_score: 50.0,
            financial_health_score: None,
            updated_at: as_of - Duration::days(2),
        }
    }

    fn event(id: &str, entity: &str, kind: EventType, impact: ImpactLevel, at: DateTime<Utc>) -> CorporateEvent {
        CorporateEvent {
            id: id.to_string(),
            entity: entity.to_string(),
            event_type: kind,
            impact,
            title: format!("{} news", entity),
            description: String::new(),
            announced_at: at,
            order_value: None,
            processed: false,
        }
    }

    fn scorer(store: SnapshotStore, config: PriorityConfig) -> PriorityScorer {
        let store = Arc::new(store);
        PriorityScorer::new(store.clone(), store, config)
    }

    fn universe(snapshot: &MarketSnapshot) -> Vec<String> {
        snapshot.entities.keys().cloned().collect()
    }

    #[tokio::test]
    async fn test_budget_bound_holds_for_large_universe() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        for i in 0..200 {
            snapshot.entity_mut(&format!("E{:03}", i)).score = Some(fundamental(75.0, now));
        }
        let mut config = PriorityConfig::default();
        config.max_fundamental_leaders = 500;
        let names = universe(&snapshot);
        let scorer = scorer(SnapshotStore::new(snapshot), config);

        let selected = scorer.select(&names, 50, now).await;
        assert_eq!(selected.len(), 50);
    }

    #[tokio::test]
    async fn test_within_budget_returns_discovery_order_unscored() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        snapshot.entity_mut("AAA").score = Some(fundamental(90.0, now));
        snapshot.entity_mut("BBB");
        snapshot.events.push(event("e1", "BBB", EventType::Dividend, ImpactLevel::High, now));
        let mut config = PriorityConfig::default();
        config.watchlist = vec!["CCC".to_string()];
        snapshot.entity_mut("CCC");
        let names = universe(&snapshot);
        let scorer = scorer(SnapshotStore::new(snapshot), config);

        let selected = scorer.select(&names, 50, now).await;
        let ids: Vec<&str> = selected.iter().map(|p| p.entity.as_str()).collect();
        assert_eq!(ids, vec!["BBB", "AAA", "CCC"]);
        assert!(selected.iter().all(|p| p.score == 0.0));
        assert_eq!(selected[0].category, PriorityCategory::EventDriven);
        assert_eq!(selected[0].urgency, Urgency::High);
        assert_eq!(selected[2].category, PriorityCategory::Watchlist);
    }

    #[tokio::test]
    async fn test_ranking_uses_weighted_formula() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        // 0.4*80 + 0.3*30 + 0.2*20 + 0.1*10 = 46
        let big = snapshot.entity_mut("BIG");
        big.score = Some(fundamental(80.0, now));
        big.valuation = Some(ValuationSnapshot {
            market_cap: Some(3e11),
            ..Default::default()
        });
        // 0.4*90 + 0.1*10 = 37
        snapshot.entity_mut("QUIET").score = Some(fundamental(90.0, now));
        // 0.4*72 + 0.2*10 + 0.1*10 = 31.8
        let small = snapshot.entity_mut("SMALL");
        small.score = Some(fundamental(72.0, now));
        small.valuation = Some(ValuationSnapshot {
            market_cap: Some(1e9),
            ..Default::default()
        });
        for (i, hours) in [1, 5].iter().enumerate() {
            snapshot.events.push(event(
                &format!("ev{}", i),
                "BIG",
                EventType::BoardMeeting,
                ImpactLevel::Medium,
                now - Duration::hours(*hours),
            ));
        }
        let names = universe(&snapshot);
        let scorer = scorer(SnapshotStore::new(snapshot), PriorityConfig::default());

        let selected = scorer.select(&names, 2, now).await;
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].entity, "BIG");
        assert!((selected[0].score - 46.0).abs() < 1e-9);
        assert_eq!(selected[1].entity, "QUIET");
        assert!((selected[1].score - 37.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ranking_weights_come_from_config() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        snapshot.entity_mut("LOUD").score = Some(fundamental(50.0, now));
        snapshot.entity_mut("QUIET").score = Some(fundamental(90.0, now));
        for (i, hours) in [2, 6].iter().enumerate() {
            snapshot.events.push(event(
                &format!("ev{}", i),
                "LOUD",
                EventType::BoardMeeting,
                ImpactLevel::Medium,
                now - Duration::hours(*hours),
            ));
        }
        let names = universe(&snapshot);

        // 0.4*50 + 0.3*30 + 0.1*10 = 30 vs 0.4*90 + 0.1*10 = 37
        let default_pick = scorer(SnapshotStore::new(snapshot.clone()), PriorityConfig::default())
            .select(&names, 1, now)
            .await;
        assert_eq!(default_pick[0].entity, "QUIET");

        // 0.4*50 + 1.0*30 + 0.1*10 = 51
        let mut config = PriorityConfig::default();
        config.weights.event = 1.0;
        let event_heavy = scorer(SnapshotStore::new(snapshot), config)
            .select(&names, 1, now)
            .await;
        assert_eq!(event_heavy[0].entity, "LOUD");
        assert!((event_heavy[0].score - 51.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ranking_reuses_discovery_score_lookups() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        for i in 0..5 {
            snapshot.entity_mut(&format!("S{}", i)).score = Some(fundamental(75.0 + i as f64, now));
        }
        let names = universe(&snapshot);
        let counting = Arc::new(CountingStore {
            inner: SnapshotStore::new(snapshot.clone()),
            score_lookups: AtomicUsize::new(0),
        });
        let scorer = PriorityScorer::new(
            counting.clone(),
            Arc::new(SnapshotStore::new(snapshot)),
            PriorityConfig::default(),
        );

        let selected = scorer.select(&names, 2, now).await;

        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].entity, "S4");
        assert_eq!(counting.score_lookups.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fundamental_leaders_capped() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        for i in 0..40 {
            snapshot.entity_mut(&format!("F{:02}", i)).score =
                Some(fundamental(70.0 + i as f64 / 2.0, now));
        }
        let names = universe(&snapshot);
        let scorer = scorer(SnapshotStore::new(snapshot), PriorityConfig::default());

        let selected = scorer.select(&names, 100, now).await;
        assert_eq!(selected.len(), 30);
        assert!(selected.iter().all(|p| p.entity.as_str() >= "F10"));
    }

    #[tokio::test]
    async fn test_other_discovery_sources() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        snapshot.entity_mut("GROW").growth = Some(GrowthSnapshot {
            revenue_growth_1y: Some(25.0),
            profit_growth_1y: Some(18.0),
            ..Default::default()
        });
        snapshot.entity_mut("SLOW").growth = Some(GrowthSnapshot {
            revenue_growth_1y: Some(25.0),
            profit_growth_1y: Some(5.0),
            ..Default::default()
        });
        snapshot.entity_mut("RES");
        snapshot.events.push(event(
            "r1",
            "RES",
            EventType::ResultsAnnouncement,
            ImpactLevel::Low,
            now - Duration::days(20),
        ));
        snapshot.entity_mut("NEXT");
        snapshot.scheduled_events.push(ScheduledEvent {
            entity: "NEXT".to_string(),
            scheduled_for: now + Duration::days(3),
            title: String::new(),
        });
        snapshot.entity_mut("STALE");
        snapshot.events.push(event(
            "old",
            "STALE",
            EventType::OrderReceived,
            ImpactLevel::High,
            now - Duration::days(20),
        ));
        let names = universe(&snapshot);
        let scorer = scorer(SnapshotStore::new(snapshot), PriorityConfig::default());

        let selected = scorer.select(&names, 50, now).await;
        let by_entity: BTreeMap<&str, &PriorityScore> =
            selected.iter().map(|p| (p.entity.as_str(), p)).collect();
        assert_eq!(by_entity["GROW"].category, PriorityCategory::Momentum);
        assert_eq!(by_entity["RES"].category, PriorityCategory::Results);
        assert_eq!(by_entity["RES"].urgency, Urgency::Medium);
        assert_eq!(by_entity["NEXT"].category, PriorityCategory::EventDriven);
        assert!(!by_entity.contains_key("SLOW"));
        assert!(!by_entity.contains_key("STALE"));
    }

    #[tokio::test]
    async fn test_entities_outside_universe_ignored() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        snapshot.events.push(event("x", "GHOST", EventType::OrderReceived, ImpactLevel::High, now));
        let scorer = scorer(SnapshotStore::new(snapshot), PriorityConfig::default());

        let selected = scorer.select(&["TCS".to_string()], 50, now).await;
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn test_failing_sources_contribute_nothing() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        snapshot.entity_mut("AAA").score = Some(fundamental(95.0, now));
        snapshot.events.push(event("e", "BBB", EventType::OrderReceived, ImpactLevel::High, now));
        snapshot.entity_mut("BBB");
        let names = universe(&snapshot);

        let no_fundamentals = scorer(
            SnapshotStore::new(snapshot.clone()).with_outage(StorePort::Fundamentals),
            PriorityConfig::default(),
        );
        let ids: Vec<String> = no_fundamentals
            .select(&names, 50, now)
            .await
            .into_iter()
            .map(|p| p.entity)
            .collect();
        assert_eq!(ids, vec!["BBB"]);

        let no_events = scorer(
            SnapshotStore::new(snapshot).with_outage(StorePort::Events),
            PriorityConfig::default(),
        );
        let ids: Vec<String> = no_events
            .select(&names, 50, now)
            .await
            .into_iter()
            .map(|p| p.entity)
            .collect();
        assert_eq!(ids, vec!["AAA"]);
    }

    #[tokio::test]
    async fn test_ranking_with_unavailable_store_scores_zero() {
        let now = Utc::now();
        let mut snapshot = MarketSnapshot::default();
        let mut config = PriorityConfig::default();
        config.watchlist = vec!["A".into(), "B".into(), "C".into()];
        for name in ["A", "B", "C"] {
            snapshot.entity_mut(name);
        }
        let names = universe(&snapshot);
        let scorer = scorer(
            SnapshotStore::new(snapshot).with_outage(StorePort::Fundamentals),
            config,
        );

        let selected = scorer.select(&names, 2, now).await;
        let ids: Vec<&str> = selected.iter().map(|p| p.entity.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(selected.iter().all(|p| p.score == 0.0));
    }
}
