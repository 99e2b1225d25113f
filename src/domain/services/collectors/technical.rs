use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;

use super::{CollectionContext, SignalCollector};
use crate::config::CollectorConfig;
use crate::domain::entities::{SignalAction, SignalCandidate, SignalSource};
use crate::domain::errors::EngineError;
use crate::domain::repositories::{IndicatorSnapshot, TechnicalIndicatorEngine};

const EFI_SCALE: f64 = 0.1;
const BUY_CONFIDENCE_RANGE: (f64, f64) = (0.4, 0.8);
const SELL_CONFIDENCE_RANGE: (f64, f64) = (0.3, 0.7);
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_CONFIRMATION_BOOST: f64 = 0.1;
const COUNTER_TREND_PENALTY: f64 = 0.1;
const VOLUME_SPIKE_CONFIDENCE: f64 = 0.5;
const MACD_FLIP_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Up,
    Down,
    Mixed,
}

/// Price vs. short and long moving averages
fn trend(snapshot: &IndicatorSnapshot) -> Trend {
    match (snapshot.last_close, snapshot.sma_short, snapshot.sma_long) {
        (Some(p), Some(s), Some(l)) if p > s && s > l => Trend::Up,
        (Some(p), Some(s), Some(l)) if p < s && s < l => Trend::Down,
        _ => Trend::Mixed,
    }
}

/// Oscillator zero-crossing on the latest bar
fn efi_crossover(snapshot: &IndicatorSnapshot) -> Option<(SignalAction, f64)> {
    let current = snapshot.oscillator_value?;
    let previous = snapshot.previous_oscillator_value?;
    if current > 0.0 && previous <= 0.0 {
        Some((SignalAction::Buy, current))
    } else if current < 0.0 && previous >= 0.0 {
        Some((SignalAction::Sell, current))
    } else {
        None
    }
}

/// EFI crossovers confirmed by RSI and trend, plus volume and MACD triggers
pub struct TechnicalCollector {
    engine: Arc<dyn TechnicalIndicatorEngine>,
    config: CollectorConfig,
}

impl TechnicalCollector {
    pub fn new(engine: Arc<dyn TechnicalIndicatorEngine>, config: CollectorConfig) -> Self {
        TechnicalCollector { engine, config }
    }

    fn crossover_candidate(
        &self,
        ctx: &CollectionContext,
        snapshot: &IndicatorSnapshot,
        action: SignalAction,
        efi: f64,
    ) -> SignalCandidate {
        let (floor, cap) = if action.is_bullish() {
            BUY_CONFIDENCE_RANGE
        } else {
            SELL_CONFIDENCE_RANGE
        };
        let mut confidence = (efi.abs() / EFI_SCALE).max(floor).min(cap);
        let mut notes = Vec::new();

        if let Some(rsi) = snapshot.rsi {
            let confirms = match action {
                SignalAction::Buy => rsi <= RSI_OVERSOLD,
                _ => rsi >= RSI_OVERBOUGHT,
            };
            if confirms {
                confidence = (confidence + RSI_CONFIRMATION_BOOST).min(cap);
                notes.push(format!("RSI {:.1} confirms", rsi));
            }
        }

        let against_trend = matches!(
            (action, trend(snapshot)),
            (SignalAction::Buy, Trend::Down) | (SignalAction::Sell, Trend::Up)
        );
        if against_trend {
            confidence = (confidence - COUNTER_TREND_PENALTY).max(floor);
            notes.push("against trend".to_string());
        }

        let direction = if action.is_bullish() { "above" } else { "below" };
        let mut reason = format!("EFI(20) crossed {} 0 ({:.4})", direction, efi);
        if !notes.is_empty() {
            reason = format!("{}, {}", reason, notes.join(", "));
        }
        let signal_type = if action.is_bullish() {
            "efi_crossover_buy"
        } else {
            "efi_crossover_sell"
        };

        SignalCandidate::new(
            ctx.entity.as_str(),
            action,
            confidence,
            SignalSource::Technical,
            reason,
            ctx.as_of,
        )
        .with_metadata("signal_type", signal_type)
        .with_metadata("efi_value", efi)
    }
}

#[async_trait]
impl SignalCollector for TechnicalCollector {
    fn source(&self) -> SignalSource {
        SignalSource::Technical
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<Vec<SignalCandidate>, EngineError> {
        if ctx.series.len() < self.config.min_history_points {
            return Err(EngineError::InsufficientMarketData {
                entity: ctx.entity.clone(),
                required: self.config.min_history_points,
                available: ctx.series.len(),
            });
        }

        let snapshot = match &ctx.indicators {
            Some(shared) => Cow::Borrowed(shared),
            None => Cow::Owned(self.engine.compute(&ctx.series)),
        };
        let mut signals = Vec::new();

        let crossover = efi_crossover(&snapshot);
        if let Some((action, efi)) = crossover {
            signals.push(self.crossover_candidate(ctx, &snapshot, action, efi));
        }

        if let (Some(volume), Some(average)) = (snapshot.last_volume, snapshot.average_volume) {
            if average > 0.0 && volume > average * self.config.volume_spike_multiple {
                let ratio = volume / average;
                signals.push(
                    SignalCandidate::new(
                        ctx.entity.as_str(),
                        SignalAction::Buy,
                        VOLUME_SPIKE_CONFIDENCE,
                        SignalSource::Technical,
                        format!("Volume spike: {:.1}x average volume", ratio),
                        ctx.as_of,
                    )
                    .with_metadata("signal_type", "volume_spike")
                    .with_metadata("volume_ratio", ratio),
                );
            }
        }

        if crossover.is_none() {
            if let (Some(current), Some(previous)) =
                (snapshot.macd_histogram, snapshot.previous_macd_histogram)
            {
                let flip = if current > 0.0 && previous <= 0.0 {
                    Some((SignalAction::Buy, "MACD bullish crossover"))
                } else if current < 0.0 && previous >= 0.0 {
                    Some((SignalAction::Sell, "MACD bearish crossover"))
                } else {
                    None
                };
                if let Some((action, reason)) = flip {
                    signals.push(
                        SignalCandidate::new(
                            ctx.entity.as_str(),
                            action,
                            MACD_FLIP_CONFIDENCE,
                            SignalSource::Technical,
                            reason,
                            ctx.as_of,
                        )
                        .with_metadata("signal_type", "macd_crossover"),
                    );
                }
            }
        }

        Ok(signals)
    }
}
