//! One analysis cycle, end to end
//!
//! PriorityScorer picks the working set, then each batch of entities is
//! analyzed concurrently (collectors, then aggregation). Risk admission, sink
//! writes and notifications run afterwards one entity at a time in priority
//! order, so the portfolio heat has a single writer. Order announcements are
//! marked processed only once their entity's outcome is settled; a deferred
//! entity keeps them for the next cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::domain::entities::{CompositeSignal, PriorityScore, SignalAction, Timeframe, Urgency};
use crate::domain::errors::{ConfigError, EngineError};
use crate::domain::repositories::{
    EventStore, FundamentalStore, MarketDataProvider, NotificationSink, SignalSink,
    TechnicalIndicatorEngine,
};
use crate::domain::services::{
    CacheStats, CollectionContext, CollectorSet, MarketConditions, PortfolioRiskState,
    PriorityScorer, ResultCache, RiskDecision, RiskManager, SignalAggregator,
};
use crate::rate_limit::{LookupRateLimiter, Throttled};

const HIGH_CONFIDENCE: f64 = 0.7;
const TOP_SIGNALS: usize = 10;

/// What happened to one entity in a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    Emitted { signal: Box<CompositeSignal> },
    NoSignal,
    Rejected { reason: String },
    Failed { error: EngineError },
    /// Already analyzed in this hour bucket; nothing is re-emitted
    Cached { previous: Box<EntityOutcome> },
}

impl EntityOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, EntityOutcome::Failed { .. })
    }

    fn is_cacheable(&self) -> bool {
        matches!(
            self,
            EntityOutcome::Emitted { .. } | EntityOutcome::NoSignal | EntityOutcome::Rejected { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSignal {
    pub entity: String,
    pub action: SignalAction,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub buy_signals: usize,
    pub sell_signals: usize,
    /// Entities analyzed without an actionable composite
    pub hold_signals: usize,
    pub rejected: usize,
    pub failed: usize,
    pub cached: usize,
    pub high_confidence_signals: usize,
    pub top_signals: Vec<TopSignal>,
}

impl CycleSummary {
    fn from_outcomes(
        outcomes: &BTreeMap<String, EntityOutcome>,
        insights: &[CompositeSignal],
    ) -> Self {
        let mut summary = CycleSummary::default();
        for outcome in outcomes.values() {
            match outcome {
                EntityOutcome::Emitted { .. } => {}
                EntityOutcome::NoSignal => summary.hold_signals += 1,
                EntityOutcome::Rejected { .. } => summary.rejected += 1,
                EntityOutcome::Failed { .. } => summary.failed += 1,
                EntityOutcome::Cached { .. } => summary.cached += 1,
            }
        }
        summary.buy_signals = insights.iter().filter(|s| s.action.is_bullish()).count();
        summary.sell_signals = insights.iter().filter(|s| s.action.is_bearish()).count();
        summary.high_confidence_signals = insights
            .iter()
            .filter(|s| s.confidence.value() >= HIGH_CONFIDENCE)
            .count();
        summary.top_signals = insights
            .iter()
            .take(TOP_SIGNALS)
            .map(|s| TopSignal {
                entity: s.entity.clone(),
                action: s.action,
                confidence: s.confidence.value(),
            })
            .collect();
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub companies_analyzed: usize,
    pub successful_analyses: usize,
    /// Entities left for the next cycle because the time budget ran out
    pub deferred: Vec<String>,
    pub timed_out: bool,
    pub summary: CycleSummary,
    /// Admitted composites, highest confidence first
    pub actionable_insights: Vec<CompositeSignal>,
    pub outcomes: BTreeMap<String, EntityOutcome>,
}

/// Read-side collaborators of the engine
#[derive(Clone)]
pub struct DataPorts {
    pub market: Arc<dyn MarketDataProvider>,
    pub fundamentals: Arc<dyn FundamentalStore>,
    pub events: Arc<dyn EventStore>,
    pub indicators: Arc<dyn TechnicalIndicatorEngine>,
}

impl DataPorts {
    /// Put every upstream lookup behind one shared limiter
    pub fn throttled(self, limiter: LookupRateLimiter) -> Self {
        DataPorts {
            market: Arc::new(Throttled::new(self.market, limiter.clone())),
            fundamentals: Arc::new(Throttled::new(self.fundamentals, limiter.clone())),
            events: Arc::new(Throttled::new(self.events, limiter)),
            indicators: self.indicators,
        }
    }
}

/// Write-side collaborators
#[derive(Clone)]
pub struct OutputSinks {
    pub signals: Arc<dyn SignalSink>,
    pub notifications: Arc<dyn NotificationSink>,
}

/// Result of the concurrent part of an entity's analysis
enum Analysis {
    Cached(EntityOutcome),
    Failed(EngineError),
    Ready {
        composite: Option<CompositeSignal>,
        market: MarketConditions,
        /// Order announcements to consume once the outcome is settled
        order_events: Vec<String>,
    },
}

pub struct CycleOrchestrator {
    config: EngineConfig,
    market: Arc<dyn MarketDataProvider>,
    fundamentals: Arc<dyn FundamentalStore>,
    events: Arc<dyn EventStore>,
    indicators: Arc<dyn TechnicalIndicatorEngine>,
    scorer: PriorityScorer,
    collectors: CollectorSet,
    aggregator: SignalAggregator,
    risk: RiskManager,
    portfolio: Mutex<PortfolioRiskState>,
    cache: ResultCache<EntityOutcome>,
    sinks: OutputSinks,
    cycles: AtomicU64,
}

impl CycleOrchestrator {
    pub fn new(config: EngineConfig, ports: DataPorts, sinks: OutputSinks) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;
        let capacity = NonZeroUsize::new(config.cache_capacity).ok_or_else(|| {
            EngineError::InvalidConfiguration(
                ConfigError::OutOfRange {
                    field: "cache_capacity",
                    value: config.cache_capacity.to_string(),
                    expected: "> 0",
                }
                .to_string(),
            )
        })?;

        let risk = RiskManager::new(config.risk.clone());
        let portfolio = Mutex::new(risk.new_portfolio_state());
        Ok(CycleOrchestrator {
            market: ports.market,
            fundamentals: ports.fundamentals.clone(),
            events: ports.events.clone(),
            indicators: ports.indicators.clone(),
            scorer: PriorityScorer::new(
                ports.fundamentals.clone(),
                ports.events.clone(),
                config.priority.clone(),
            ),
            collectors: CollectorSet::standard(
                ports.fundamentals,
                ports.events,
                ports.indicators,
                config.collectors.clone(),
            ),
            aggregator: SignalAggregator::new(config.aggregator.clone()),
            risk,
            portfolio,
            cache: ResultCache::new(capacity, config.cache_ttl()),
            sinks,
            cycles: AtomicU64::new(0),
            config,
        })
    }

    /// Replace the built-in collectors, e.g. with a reduced set
    pub fn with_collectors(mut self, collectors: CollectorSet) -> Self {
        self.collectors = collectors;
        self
    }

    /// Seed the heat ledger with exposure carried over from earlier runs
    pub async fn set_portfolio(&self, state: PortfolioRiskState) {
        *self.portfolio.lock().await = state;
    }

    pub async fn portfolio(&self) -> PortfolioRiskState {
        self.portfolio.lock().await.clone()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as of `as_of`
    ///
    /// Never fails: per-entity problems land in `outcomes`, and entities not
    /// reached before the time budget runs out are listed in `deferred`.
    pub async fn run_cycle_at(&self, as_of: DateTime<Utc>) -> CycleReport {
        let cycle_id = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let deadline = Instant::now() + self.config.cycle_time_budget();
        info!(cycle_id = cycle_id, as_of = %as_of, "🔄 Analysis cycle started");

        let universe = self.universe().await;
        let priorities = self
            .scorer
            .select(&universe, self.config.priority.max_companies_per_batch, as_of)
            .await;
        info!(
            cycle_id = cycle_id,
            universe = universe.len(),
            selected = priorities.len(),
            "Priority list built"
        );

        let mut outcomes = BTreeMap::new();
        let mut insights = Vec::new();
        let mut deferred = Vec::new();
        let mut timed_out = false;

        let batch_size = self.config.batch_size.max(1);
        for (index, batch) in priorities.chunks(batch_size).enumerate() {
            if timed_out || Instant::now() >= deadline {
                timed_out = true;
                deferred.extend(batch.iter().map(|p| p.entity.clone()));
                continue;
            }

            debug!(cycle_id = cycle_id, batch = index + 1, size = batch.len(), "Processing batch");
            let analyses = match tokio::time::timeout_at(deadline, self.analyze_batch(batch, as_of)).await {
                Ok(analyses) => analyses,
                Err(_) => {
                    warn!(cycle_id = cycle_id, batch = index + 1, "Cycle time budget exhausted mid-batch");
                    timed_out = true;
                    deferred.extend(batch.iter().map(|p| p.entity.clone()));
                    continue;
                }
            };

            for (priority, analysis) in batch.iter().zip(analyses) {
                let outcome = self.settle(&priority.entity, analysis, as_of).await;
                if let EntityOutcome::Emitted { signal } = &outcome {
                    insights.push((**signal).clone());
                }
                outcomes.insert(priority.entity.clone(), outcome);
            }
        }

        if timed_out {
            warn!(cycle_id = cycle_id, deferred = deferred.len(), "Entities deferred to next cycle");
        }

        insights.sort_by(|a, b| {
            b.confidence
                .value()
                .total_cmp(&a.confidence.value())
                .then_with(|| a.entity.cmp(&b.entity))
        });

        let summary = CycleSummary::from_outcomes(&outcomes, &insights);
        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            companies_analyzed: outcomes.len(),
            successful_analyses: outcomes.values().filter(|o| o.is_success()).count(),
            deferred,
            timed_out,
            summary,
            actionable_insights: insights,
            outcomes,
        };
        info!(
            cycle_id = cycle_id,
            analyzed = report.companies_analyzed,
            successful = report.successful_analyses,
            emitted = report.actionable_insights.len(),
            deferred = report.deferred.len(),
            "✅ Analysis cycle finished"
        );
        report
    }

    /// Every listed entity plus the watchlist
    async fn universe(&self) -> Vec<String> {
        let mut universe: BTreeSet<String> = match self.fundamentals.list_entities().await {
            Ok(entities) => entities.into_iter().collect(),
            Err(e) => {
                error!(error = %e, "Could not list entities, falling back to watchlist");
                BTreeSet::new()
            }
        };
        universe.extend(self.config.priority.watchlist.iter().cloned());
        universe.into_iter().collect()
    }

    async fn analyze_batch(&self, batch: &[PriorityScore], as_of: DateTime<Utc>) -> Vec<Analysis> {
        join_all(batch.iter().map(|p| self.analyze(&p.entity, as_of))).await
    }

    async fn analyze(&self, entity: &str, as_of: DateTime<Utc>) -> Analysis {
        if let Some(previous) = self.cache.get(entity, as_of).await {
            debug!(entity = %entity, "Result cache hit");
            return Analysis::Cached(previous);
        }

        let ctx = self.load_context(entity, as_of).await;
        let collected = self.collectors.collect(&ctx).await;

        let composite = match self.aggregator.aggregate(entity, &collected.candidates) {
            Ok(composite) => composite,
            Err(e) => return Analysis::Failed(e),
        };
        if composite.is_none() {
            if let Some(e) = collected.insufficient_market_data() {
                return Analysis::Failed(e.clone());
            }
        }

        let market = MarketConditions {
            reference_price: ctx.reference_price(),
            volatility: ctx.indicators.as_ref().and_then(|i| i.volatility),
            price_change_pct: ctx.quote.as_ref().map(|q| q.change_pct),
            volume: ctx.quote.as_ref().map(|q| q.volume),
        };
        Analysis::Ready {
            composite,
            market,
            order_events: collected.order_event_ids(),
        }
    }

    /// Series, quote and indicators fetched once, shared by collectors and the risk gate
    async fn load_context(&self, entity: &str, as_of: DateTime<Utc>) -> CollectionContext {
        let (series, quote) = tokio::join!(
            self.market.get_historical_series(
                entity,
                Timeframe::Daily,
                self.config.collectors.history_days
            ),
            self.market.get_live_quote(entity)
        );
        let series = series.unwrap_or_else(|e| {
            warn!(entity = %entity, error = %e, "Historical series unavailable");
            None
        });
        let quote = quote.unwrap_or_else(|e| {
            warn!(entity = %entity, error = %e, "Live quote unavailable");
            None
        });
        let series = series.unwrap_or_default();
        let indicators = (!series.is_empty()).then(|| self.indicators.compute(&series));
        CollectionContext::new(entity, as_of)
            .with_series(series)
            .with_quote(quote)
            .with_indicators(indicators)
    }

    /// Risk admission and output for one analyzed entity
    async fn settle(&self, entity: &str, analysis: Analysis, as_of: DateTime<Utc>) -> EntityOutcome {
        let (outcome, order_events) = match analysis {
            Analysis::Cached(previous) => {
                return EntityOutcome::Cached {
                    previous: Box::new(previous),
                }
            }
            Analysis::Failed(error) => {
                warn!(entity = %entity, error = %error, "Entity analysis failed");
                (EntityOutcome::Failed { error }, Vec::new())
            }
            Analysis::Ready {
                composite: None,
                order_events,
                ..
            } => {
                debug!(entity = %entity, "No actionable composite");
                (EntityOutcome::NoSignal, order_events)
            }
            Analysis::Ready {
                composite: Some(composite),
                market,
                order_events,
            } => {
                let decision = {
                    let mut portfolio = self.portfolio.lock().await;
                    self.risk.admit(composite, &market, &mut portfolio)
                };
                let outcome = match decision {
                    RiskDecision::Rejected { reason } => EntityOutcome::Rejected { reason },
                    RiskDecision::Admitted(signal) => self.emit(*signal).await,
                };
                (outcome, order_events)
            }
        };

        if outcome.is_cacheable() {
            self.consume_order_events(entity, &order_events).await;
            self.cache.insert(entity, as_of, outcome.clone()).await;
        }
        outcome
    }

    /// Order announcements are spent only by a settled analysis
    async fn consume_order_events(&self, entity: &str, event_ids: &[String]) {
        for event_id in event_ids {
            if let Err(e) = self.events.mark_processed(event_id).await {
                warn!(
                    entity = %entity,
                    event_id = %event_id,
                    error = %e,
                    "Failed to mark order event processed, it may be emitted again"
                );
            }
        }
    }

    async fn emit(&self, signal: CompositeSignal) -> EntityOutcome {
        match self.sinks.signals.store(&signal).await {
            Ok(true) => {}
            Ok(false) => {
                return EntityOutcome::Failed {
                    error: EngineError::SinkRejected {
                        entity: signal.entity.clone(),
                    },
                }
            }
            Err(e) => {
                error!(entity = %signal.entity, error = %e, "Signal sink failed");
                return EntityOutcome::Failed { error: e.into() };
            }
        }

        if self.config.notify_high_urgency && signal.urgency == Urgency::High {
            if let Err(e) = self.sinks.notifications.send(&signal).await {
                warn!(entity = %signal.entity, error = %e, "High-urgency notification failed");
            }
        }
        EntityOutcome::Emitted {
            signal: Box::new(signal),
        }
    }
}
