use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{CollectionContext, SignalCollector};
use crate::config::CollectorConfig;
use crate::domain::entities::{EventType, SignalAction, SignalCandidate, SignalSource};
use crate::domain::errors::EngineError;
use crate::domain::repositories::{EventStore, EventWindow, FundamentalStore};

const CRORE: f64 = 1e7;
const MAJOR_ORDER_RATIO: f64 = 0.10;
const SIGNIFICANT_ORDER_RATIO: f64 = 0.05;

/// "₹100 crore", "Rs. 500 Cr", "INR 1,200 crore"
static ORDER_VALUE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)(?:₹|\brs\.?|\binr)\s*(\d+(?:,\d+)*(?:\.\d+)?)\s*(?:crores?|cr)\b").ok()
});

/// Order value in currency units, read from free text quoted in crores
pub fn parse_order_value(text: &str) -> Option<f64> {
    let pattern = ORDER_VALUE_PATTERN.as_ref()?;
    let captures = pattern.captures(text)?;
    let amount: f64 = captures.get(1)?.as_str().replace(',', "").parse().ok()?;
    Some(amount * CRORE)
}

/// Fresh order wins sized against market cap
///
/// Events already marked processed are skipped. Marking is left to whoever
/// settles the entity's outcome, so collecting has no side effects.
pub struct OrderAnnouncementCollector {
    fundamentals: Arc<dyn FundamentalStore>,
    events: Arc<dyn EventStore>,
    config: CollectorConfig,
}

impl OrderAnnouncementCollector {
    pub fn new(
        fundamentals: Arc<dyn FundamentalStore>,
        events: Arc<dyn EventStore>,
        config: CollectorConfig,
    ) -> Self {
        OrderAnnouncementCollector {
            fundamentals,
            events,
            config,
        }
    }
}

#[async_trait]
impl SignalCollector for OrderAnnouncementCollector {
    fn source(&self) -> SignalSource {
        SignalSource::Order
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<Vec<SignalCandidate>, EngineError> {
        let window =
            EventWindow::trailing(ctx.as_of, Duration::hours(self.config.order_lookback_hours));
        let fresh: Vec<_> = self
            .events
            .get_recent_events(&ctx.entity, window)
            .await?
            .into_iter()
            .filter(|e| e.event_type == EventType::OrderReceived && !e.processed)
            .collect();
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let market_cap = self
            .fundamentals
            .get_valuation(&ctx.entity)
            .await?
            .and_then(|v| v.market_cap)
            .filter(|cap| *cap > 0.0);
        let Some(market_cap) = market_cap else {
            debug!(entity = %ctx.entity, "No market cap, order announcements not sized");
            return Ok(Vec::new());
        };

        let mut signals = Vec::new();
        for event in fresh {
            let value = event
                .order_value
                .or_else(|| parse_order_value(&event.description))
                .or_else(|| parse_order_value(&event.title))
                .filter(|v| *v > 0.0);
            let Some(value) = value else {
                debug!(entity = %ctx.entity, event_id = %event.id, "Order value unknown");
                continue;
            };

            let ratio = value / market_cap;
            let crores = value / CRORE;
            let (confidence, reason) = if ratio >= MAJOR_ORDER_RATIO {
                (
                    0.9,
                    format!(
                        "Major order worth ₹{:.0}Cr ({:.1}% of market cap)",
                        crores,
                        ratio * 100.0
                    ),
                )
            } else if ratio >= SIGNIFICANT_ORDER_RATIO {
                (
                    0.75,
                    format!(
                        "Significant order worth ₹{:.0}Cr ({:.1}% of market cap)",
                        crores,
                        ratio * 100.0
                    ),
                )
            } else {
                (0.6, format!("New order announcement worth ₹{:.0}Cr", crores))
            };

            signals.push(
                SignalCandidate::new(
                    ctx.entity.as_str(),
                    SignalAction::Buy,
                    confidence,
                    SignalSource::Event,
                    reason,
                    ctx.as_of,
                )
                .with_source(SignalSource::Order)
                .with_metadata("signal_type", "fresh_order_announcement")
                .with_metadata("order_value", value)
                .with_metadata("order_to_mcap_ratio", ratio)
                .with_metadata("event_id", event.id.as_str()),
            );
        }

        Ok(signals)
    }
}
