use async_trait::async_trait;

use crate::domain::entities::{EarningsSurprise, FundamentalScore, GrowthSnapshot, ValuationSnapshot};
use crate::domain::errors::ProviderError;

/// Read-only repository of fundamental records, returned as plain values
#[async_trait]
pub trait FundamentalStore: Send + Sync {
    /// Every active entity the store knows about
    async fn list_entities(&self) -> Result<Vec<String>, ProviderError>;

    async fn get_score(&self, entity: &str) -> Result<Option<FundamentalScore>, ProviderError>;

    async fn get_valuation(&self, entity: &str) -> Result<Option<ValuationSnapshot>, ProviderError>;

    async fn get_growth(&self, entity: &str) -> Result<Option<GrowthSnapshot>, ProviderError>;

    async fn get_earnings_surprise(
        &self,
        entity: &str,
    ) -> Result<Option<EarningsSurprise>, ProviderError>;
}
