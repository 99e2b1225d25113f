//! JSON snapshot-backed data providers
//!
//! A [`MarketSnapshot`] holds everything a cycle reads: candles and quotes,
//! fundamental records and corporate events. [`SnapshotStore`] serves it
//! through the read ports so a cycle can run offline against a file, and
//! tests can build one in code.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::entities::{
    Candle, CorporateEvent, EarningsSurprise, FundamentalScore, GrowthSnapshot, Quote, Timeframe,
    ValuationSnapshot,
};
use crate::domain::errors::ProviderError;
use crate::domain::repositories::{EventStore, EventWindow, FundamentalStore, MarketDataProvider};
use crate::domain::value_objects::Price;

const TRADING_DAYS_PER_WEEK: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Daily bars, oldest first
    #[serde(default)]
    pub candles: Vec<Candle>,
    #[serde(default)]
    pub quote: Option<Quote>,
    #[serde(default)]
    pub score: Option<FundamentalScore>,
    #[serde(default)]
    pub valuation: Option<ValuationSnapshot>,
    #[serde(default)]
    pub growth: Option<GrowthSnapshot>,
    #[serde(default)]
    pub earnings: Option<EarningsSurprise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub entity: String,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub entities: BTreeMap<String, EntitySnapshot>,
    #[serde(default)]
    pub events: Vec<CorporateEvent>,
    #[serde(default)]
    pub scheduled_events: Vec<ScheduledEvent>,
}

impl MarketSnapshot {
    pub fn entity_mut(&mut self, entity: &str) -> &mut EntitySnapshot {
        self.entities.entry(entity.to_string()).or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProviderError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let snapshot = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            entities = snapshot.entities.len(),
            events = snapshot.events.len(),
            "Market snapshot loaded"
        );
        Ok(snapshot)
    }
}

/// Port that can be switched off to simulate an upstream outage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StorePort {
    MarketData,
    Fundamentals,
    Events,
}

/// Serves a [`MarketSnapshot`] through every read port
///
/// Event `processed` flags are the only mutable state.
pub struct SnapshotStore {
    entities: BTreeMap<String, EntitySnapshot>,
    scheduled_events: Vec<ScheduledEvent>,
    events: RwLock<Vec<CorporateEvent>>,
    outages: BTreeSet<StorePort>,
}

impl SnapshotStore {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        SnapshotStore {
            entities: snapshot.entities,
            scheduled_events: snapshot.scheduled_events,
            events: RwLock::new(snapshot.events),
            outages: BTreeSet::new(),
        }
    }

    pub fn with_outage(mut self, port: StorePort) -> Self {
        self.outages.insert(port);
        self
    }

    fn ensure_up(&self, port: StorePort) -> Result<(), ProviderError> {
        if self.outages.contains(&port) {
            return Err(ProviderError::Unavailable(format!("{:?} store offline", port)));
        }
        Ok(())
    }

    pub async fn is_processed(&self, event_id: &str) -> bool {
        self.events
            .read()
            .await
            .iter()
            .any(|e| e.id == event_id && e.processed)
    }
}

/// Fold consecutive daily bars into weekly ones
fn to_weekly(daily: &[Candle]) -> Vec<Candle> {
    daily
        .chunks(TRADING_DAYS_PER_WEEK)
        .filter_map(|week| {
            let first = week.first()?;
            let last = week.last()?;
            let high = week.iter().map(|c| c.high.value()).fold(f64::MIN, f64::max);
            let low = week.iter().map(|c| c.low.value()).fold(f64::MAX, f64::min);
            Some(Candle {
                open: first.open,
                high: Price::new(high).ok()?,
                low: Price::new(low).ok()?,
                close: last.close,
                volume: week.iter().map(|c| c.volume).sum(),
            })
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for SnapshotStore {
    async fn get_historical_series(
        &self,
        entity: &str,
        timeframe: Timeframe,
        days: u32,
    ) -> Result<Option<Vec<Candle>>, ProviderError> {
        self.ensure_up(StorePort::MarketData)?;
        let candles = match self.entities.get(entity) {
            Some(snapshot) if !snapshot.candles.is_empty() => &snapshot.candles,
            _ => return Ok(None),
        };
        let start = candles.len().saturating_sub(days as usize);
        let window = &candles[start..];
        let series = match timeframe {
            Timeframe::Daily => window.to_vec(),
            Timeframe::Weekly => to_weekly(window),
        };
        debug!(entity = %entity, bars = series.len(), "Serving historical series");
        Ok(Some(series))
    }

    async fn get_live_quote(&self, entity: &str) -> Result<Option<Quote>, ProviderError> {
        self.ensure_up(StorePort::MarketData)?;
        Ok(self.entities.get(entity).and_then(|s| s.quote.clone()))
    }
}

#[async_trait]
impl FundamentalStore for SnapshotStore {
    async fn list_entities(&self) -> Result<Vec<String>, ProviderError> {
        self.ensure_up(StorePort::Fundamentals)?;
        Ok(self.entities.keys().cloned().collect())
    }

    async fn get_score(&self, entity: &str) -> Result<Option<FundamentalScore>, ProviderError> {
        self.ensure_up(StorePort::Fundamentals)?;
        Ok(self.entities.get(entity).and_then(|s| s.score.clone()))
    }

    async fn get_valuation(&self, entity: &str) -> Result<Option<ValuationSnapshot>, ProviderError> {
        self.ensure_up(StorePort::Fundamentals)?;
        Ok(self.entities.get(entity).and_then(|s| s.valuation.clone()))
    }

    async fn get_growth(&self, entity: &str) -> Result<Option<GrowthSnapshot>, ProviderError> {
        self.ensure_up(StorePort::Fundamentals)?;
        Ok(self.entities.get(entity).and_then(|s| s.growth.clone()))
    }

    async fn get_earnings_surprise(
        &self,
        entity: &str,
    ) -> Result<Option<EarningsSurprise>, ProviderError> {
        self.ensure_up(StorePort::Fundamentals)?;
        Ok(self.entities.get(entity).and_then(|s| s.earnings.clone()))
    }
}

#[async_trait]
impl EventStore for SnapshotStore {
    async fn get_recent_events(
        &self,
        entity: &str,
        window: EventWindow,
    ) -> Result<Vec<CorporateEvent>, ProviderError> {
        self.ensure_up(StorePort::Events)?;
        let mut found: Vec<CorporateEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.entity == entity && window.contains(e.announced_at))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.announced_at.cmp(&a.announced_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn get_events_in(&self, window: EventWindow) -> Result<Vec<CorporateEvent>, ProviderError> {
        self.ensure_up(StorePort::Events)?;
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| window.contains(e.announced_at))
            .cloned()
            .collect())
    }

    async fn get_upcoming_events(&self, window: EventWindow) -> Result<BTreeSet<String>, ProviderError> {
        self.ensure_up(StorePort::Events)?;
        Ok(self
            .scheduled_events
            .iter()
            .filter(|s| window.contains(s.scheduled_for))
            .map(|s| s.entity.clone())
            .collect())
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), ProviderError> {
        self.ensure_up(StorePort::Events)?;
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| ProviderError::NotFound(format!("event {}", event_id)))?;
        event.processed = true;
        debug!(event_id = %event_id, "Event marked processed");
        Ok(())
    }
}
