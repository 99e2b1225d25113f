//! Market Data Port
//!
//! Read-only access to price history and live quotes. Implementations may
//! block on network I/O; callers treat every error as "no data" for the
//! entity in question.

use async_trait::async_trait;

use crate::domain::entities::{Candle, Quote, Timeframe};
use crate::domain::errors::ProviderError;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Historical bars for `entity`, oldest first
    ///
    /// # Returns
    /// `Ok(None)` when the provider has no series for the entity
    async fn get_historical_series(
        &self,
        entity: &str,
        timeframe: Timeframe,
        days: u32,
    ) -> Result<Option<Vec<Candle>>, ProviderError>;

    async fn get_live_quote(&self, entity: &str) -> Result<Option<Quote>, ProviderError>;
}
