use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::entities::CorporateEvent;
use crate::domain::errors::ProviderError;

/// Closed time interval `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl EventWindow {
    /// The `span` leading up to `as_of`
    pub fn trailing(as_of: DateTime<Utc>, span: Duration) -> Self {
        EventWindow {
            from: as_of - span,
            to: as_of,
        }
    }

    /// The `span` following `as_of`
    pub fn ahead(as_of: DateTime<Utc>, span: Duration) -> Self {
        EventWindow {
            from: as_of,
            to: as_of + span,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events for one entity announced inside `window`, newest first
    async fn get_recent_events(
        &self,
        entity: &str,
        window: EventWindow,
    ) -> Result<Vec<CorporateEvent>, ProviderError>;

    /// Events for every entity announced inside `window`
    async fn get_events_in(&self, window: EventWindow) -> Result<Vec<CorporateEvent>, ProviderError>;

    /// Entities with a scheduled event inside `window`
    async fn get_upcoming_events(&self, window: EventWindow) -> Result<BTreeSet<String>, ProviderError>;

    /// Record that a candidate was emitted for this event so later cycles skip it
    async fn mark_processed(&self, event_id: &str) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_window_includes_both_ends() {
        let now = Utc::now();
        let w = EventWindow::trailing(now, Duration::days(7));
        assert!(w.contains(now - Duration::days(7)));
        assert!(w.contains(now - Duration::seconds(1)));
        assert!(w.contains(now));
        assert!(!w.contains(now + Duration::seconds(1)));
        assert!(!w.contains(now - Duration::days(8)));
    }

    #[test]
    fn test_ahead_window() {
        let now = Utc::now();
        let w = EventWindow::ahead(now, Duration::days(7));
        assert!(w.contains(now + Duration::days(3)));
        assert!(!w.contains(now - Duration::days(1)));
    }
}
