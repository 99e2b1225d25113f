use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::entities::CompositeSignal;
use crate::domain::errors::ProviderError;
use crate::domain::repositories::{NotificationSink, SignalSink};

/// Keeps emitted composites in memory, one per entity
#[derive(Default)]
pub struct InMemorySignalSink {
    stored: Mutex<Vec<CompositeSignal>>,
    read_only: bool,
}

impl InMemorySignalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that declines every signal
    pub fn read_only() -> Self {
        InMemorySignalSink {
            stored: Mutex::new(Vec::new()),
            read_only: true,
        }
    }

    pub async fn stored(&self) -> Vec<CompositeSignal> {
        self.stored.lock().await.clone()
    }
}

#[async_trait]
impl SignalSink for InMemorySignalSink {
    async fn store(&self, signal: &CompositeSignal) -> Result<bool, ProviderError> {
        if self.read_only {
            warn!(entity = %signal.entity, "Sink is read-only, composite declined");
            return Ok(false);
        }
        let mut stored = self.stored.lock().await;
        // Same entity in the same generation window replaces the earlier row.
        stored.retain(|s| !(s.entity == signal.entity && s.generated_at == signal.generated_at));
        stored.push(signal.clone());
        Ok(true)
    }
}

/// Writes HIGH-urgency alerts to the log and remembers them
#[derive(Default)]
pub struct LoggingNotificationSink {
    sent: Mutex<Vec<CompositeSignal>>,
}

impl LoggingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<CompositeSignal> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn send(&self, signal: &CompositeSignal) -> Result<(), ProviderError> {
        info!(
            entity = %signal.entity,
            action = %signal.action,
            confidence = signal.confidence.value(),
            urgency = ?signal.urgency,
            stop_loss = ?signal.stop_loss.map(|p| p.value()),
            target_price = ?signal.target_price.map(|p| p.value()),
            "🚨 High-urgency signal"
        );
        self.sent.lock().await.push(signal.clone());
        Ok(())
    }
}
