//! Lookup throttling for the upstream data ports
//!
//! One limiter is shared by every wrapped port, so a cycle's fan-out across
//! collectors and entities stays under a single per-minute quota.

use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

use crate::domain::entities::{
    Candle, CorporateEvent, EarningsSurprise, FundamentalScore, GrowthSnapshot, Quote, Timeframe,
    ValuationSnapshot,
};
use crate::domain::errors::{ConfigError, ProviderError};
use crate::domain::repositories::{EventStore, EventWindow, FundamentalStore, MarketDataProvider};

pub type LookupRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn create_rate_limiter(lookups_per_minute: u32) -> Result<LookupRateLimiter, ConfigError> {
    let per_minute = NonZeroU32::new(lookups_per_minute).ok_or(ConfigError::OutOfRange {
        field: "lookups_per_minute",
        value: lookups_per_minute.to_string(),
        expected: "> 0",
    })?;
    Ok(Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))))
}

/// Wraps a port so every call first waits for a permit
pub struct Throttled<P: ?Sized> {
    inner: Arc<P>,
    limiter: LookupRateLimiter,
}

impl<P: ?Sized> Throttled<P> {
    pub fn new(inner: Arc<P>, limiter: LookupRateLimiter) -> Self {
        Throttled { inner, limiter }
    }

    async fn permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Throttled<P> {
    async fn get_historical_series(
        &self,
        entity: &str,
        timeframe: Timeframe,
        days: u32,
    ) -> Result<Option<Vec<Candle>>, ProviderError> {
        self.permit().await;
        self.inner.get_historical_series(entity, timeframe, days).await
    }

    async fn get_live_quote(&self, entity: &str) -> Result<Option<Quote>, ProviderError> {
        self.permit().await;
        self.inner.get_live_quote(entity).await
    }
}

#[async_trait]
impl<P: FundamentalStore + ?Sized> FundamentalStore for Throttled<P> {
    async fn list_entities(&self) -> Result<Vec<String>, ProviderError> {
        self.permit().await;
        self.inner.list_entities().await
    }

    async fn get_score(&self, entity: &str) -> Result<Option<FundamentalScore>, ProviderError> {
        self.permit().await;
        self.inner.get_score(entity).await
    }

    async fn get_valuation(&self, entity: &str) -> Result<Option<ValuationSnapshot>, ProviderError> {
        self.permit().await;
        self.inner.get_valuation(entity).await
    }

    async fn get_growth(&self, entity: &str) -> Result<Option<GrowthSnapshot>, ProviderError> {
        self.permit().await;
        self.inner.get_growth(entity).await
    }

    async fn get_earnings_surprise(
        &self,
        entity: &str,
    ) -> Result<Option<EarningsSurprise>, ProviderError> {
        self.permit().await;
        self.inner.get_earnings_surprise(entity).await
    }
}

#[async_trait]
impl<P: EventStore + ?Sized> EventStore for Throttled<P> {
    async fn get_recent_events(
        &self,
        entity: &str,
        window: EventWindow,
    ) -> Result<Vec<CorporateEvent>, ProviderError> {
        self.permit().await;
        self.inner.get_recent_events(entity, window).await
    }

    async fn get_events_in(&self, window: EventWindow) -> Result<Vec<CorporateEvent>, ProviderError> {
        self.permit().await;
        self.inner.get_events_in(window).await
    }

    async fn get_upcoming_events(&self, window: EventWindow) -> Result<BTreeSet<String>, ProviderError> {
        self.permit().await;
        self.inner.get_upcoming_events(window).await
    }

    // Writes are not throttled
    async fn mark_processed(&self, event_id: &str) -> Result<(), ProviderError> {
        self.inner.mark_processed(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::snapshot::{MarketSnapshot, SnapshotStore};

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(50).unwrap();
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_zero_quota_rejected() {
        assert!(matches!(
            create_rate_limiter(0),
            Err(ConfigError::OutOfRange { field: "lookups_per_minute", .. })
        ));
    }

    #[tokio::test]
    async fn test_throttled_port_consumes_permits() {
        let mut snapshot = MarketSnapshot::default();
        snapshot.entity_mut("TCS");
        let store = Arc::new(SnapshotStore::new(snapshot));
        let limiter = create_rate_limiter(2).unwrap();
        let throttled = Throttled::new(store, limiter.clone());

        let entities = FundamentalStore::list_entities(&throttled).await.unwrap();
        assert_eq!(entities, vec!["TCS".to_string()]);
        assert!(FundamentalStore::get_score(&throttled, "TCS").await.unwrap().is_none());
        assert!(limiter.check().is_err());
    }
}
