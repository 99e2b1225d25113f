use async_trait::async_trait;

use crate::domain::entities::CompositeSignal;
use crate::domain::errors::ProviderError;

/// Persistence of emitted decisions. Ownership passes to the sink.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// # Returns
    /// `Ok(true)` when the signal was stored, `Ok(false)` when the sink declined it
    async fn store(&self, signal: &CompositeSignal) -> Result<bool, ProviderError>;
}

/// Alerting channel for HIGH-urgency outcomes
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, signal: &CompositeSignal) -> Result<(), ProviderError>;
}
