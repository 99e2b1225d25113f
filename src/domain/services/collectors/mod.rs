//! Signal collectors
//!
//! Each collector turns one family of evidence into zero or more
//! [`SignalCandidate`]s for an entity. Collectors are independent of each other
//! and may run in any order; [`CollectorSet`] runs them concurrently and
//! absorbs their failures so one broken source never costs the others.

pub mod earnings;
pub mod event;
pub mod fundamental;
pub mod momentum;
pub mod order;
pub mod technical;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, warn};

use crate::config::CollectorConfig;
use crate::domain::entities::{Candle, Quote, SignalCandidate, SignalSource};
use crate::domain::errors::EngineError;
use crate::domain::repositories::{
    EventStore, FundamentalStore, IndicatorSnapshot, TechnicalIndicatorEngine,
};

pub use earnings::EarningsCollector;
pub use event::EventCollector;
pub use fundamental::FundamentalCollector;
pub use momentum::MomentumCollector;
pub use order::{parse_order_value, OrderAnnouncementCollector};
pub use technical::TechnicalCollector;

/// Per-entity inputs fetched once and shared by every collector
#[derive(Debug, Clone)]
pub struct CollectionContext {
    pub entity: String,
    pub as_of: DateTime<Utc>,
    /// Daily bars, oldest first; empty when the provider had none
    pub series: Vec<Candle>,
    pub quote: Option<Quote>,
    /// Indicators over `series`, computed once per entity when the caller has them
    pub indicators: Option<IndicatorSnapshot>,
}

impl CollectionContext {
    pub fn new(entity: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        CollectionContext {
            entity: entity.into(),
            as_of,
            series: Vec::new(),
            quote: None,
            indicators: None,
        }
    }

    pub fn with_series(mut self, series: Vec<Candle>) -> Self {
        self.series = series;
        self
    }

    pub fn with_quote(mut self, quote: Option<Quote>) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_indicators(mut self, indicators: Option<IndicatorSnapshot>) -> Self {
        self.indicators = indicators;
        self
    }

    /// Live quote price, falling back to the latest close
    pub fn reference_price(&self) -> Option<f64> {
        self.quote
            .as_ref()
            .map(|q| q.last_price.value())
            .or_else(|| self.series.last().map(|c| c.close.value()))
            .filter(|p| *p > 0.0)
    }
}

#[async_trait]
pub trait SignalCollector: Send + Sync {
    fn source(&self) -> SignalSource;

    /// Produce candidates for `ctx.entity`
    ///
    /// Missing data yields `Ok(vec![])`; an error means the source could not be
    /// consulted at all.
    async fn collect(&self, ctx: &CollectionContext) -> Result<Vec<SignalCandidate>, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorFailure {
    pub source: SignalSource,
    pub error: EngineError,
}

/// Candidates gathered for one entity plus the sources that failed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub candidates: Vec<SignalCandidate>,
    pub failures: Vec<CollectorFailure>,
}

impl Collected {
    pub fn insufficient_market_data(&self) -> Option<&EngineError> {
        self.failures
            .iter()
            .map(|f| &f.error)
            .find(|e| matches!(e, EngineError::InsufficientMarketData { .. }))
    }

    /// Ids of the order announcements behind the candidates, sorted and unique
    pub fn order_event_ids(&self) -> Vec<String> {
        let ids: BTreeSet<String> = self
            .candidates
            .iter()
            .filter(|c| c.sources.contains(&SignalSource::Order))
            .filter_map(|c| c.metadata.get("event_id").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();
        ids.into_iter().collect()
    }
}

pub struct CollectorSet {
    collectors: Vec<Box<dyn SignalCollector>>,
}

impl CollectorSet {
    pub fn new(collectors: Vec<Box<dyn SignalCollector>>) -> Self {
        CollectorSet { collectors }
    }

    /// The six built-in collectors over the given stores
    pub fn standard(
        fundamentals: Arc<dyn FundamentalStore>,
        events: Arc<dyn EventStore>,
        indicators: Arc<dyn TechnicalIndicatorEngine>,
        config: CollectorConfig,
    ) -> Self {
        CollectorSet::new(vec![
            Box::new(FundamentalCollector::new(fundamentals.clone())),
            Box::new(TechnicalCollector::new(indicators, config.clone())),
            Box::new(EventCollector::new(events.clone(), config.clone())),
            Box::new(MomentumCollector::new(fundamentals.clone())),
            Box::new(EarningsCollector::new(fundamentals.clone())),
            Box::new(OrderAnnouncementCollector::new(fundamentals, events, config)),
        ])
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Run every collector concurrently; never fails
    pub async fn collect(&self, ctx: &CollectionContext) -> Collected {
        let results = join_all(self.collectors.iter().map(|c| async move {
            (c.source(), c.collect(ctx).await)
        }))
        .await;

        let mut collected = Collected::default();
        for (source, result) in results {
            match result {
                Ok(mut candidates) => {
                    debug!(
                        entity = %ctx.entity,
                        source = %source,
                        count = candidates.len(),
                        "Collector finished"
                    );
                    collected.candidates.append(&mut candidates);
                }
                Err(e @ EngineError::InsufficientMarketData { .. }) => {
                    warn!(entity = %ctx.entity, source = %source, "{}", e);
                    collected.failures.push(CollectorFailure { source, error: e });
                }
                Err(e) => {
                    error!(entity = %ctx.entity, source = %source, error = %e, "Collector failed");
                    collected.failures.push(CollectorFailure { source, error: e });
                }
            }
        }
        collected
    }
}
