//! Portfolio heat gate and stop/target placement
//!
//! Heat is the sum of the risk-at-stake of admitted positions, in percent of
//! capital. A BUY that would push heat above the ceiling is dropped; a SELL is
//! always admitted and releases whatever risk its entity carried.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::domain::entities::{CompositeSignal, RiskLevel, Urgency};
use crate::domain::errors::EngineError;
use crate::domain::value_objects::Price;

/// Heat ledger, owned by whoever serializes admissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRiskState {
    current_heat: f64,
    max_heat: f64,
    positions: BTreeMap<String, f64>,
}

impl PortfolioRiskState {
    pub fn new(max_heat: f64) -> Self {
        PortfolioRiskState {
            current_heat: 0.0,
            max_heat,
            positions: BTreeMap::new(),
        }
    }

    /// Start from existing exposure, e.g. positions opened in earlier cycles
    pub fn with_positions(max_heat: f64, positions: BTreeMap<String, f64>) -> Self {
        let current_heat = positions.values().sum();
        PortfolioRiskState {
            current_heat,
            max_heat,
            positions,
        }
    }

    pub fn current_heat(&self) -> f64 {
        self.current_heat
    }

    pub fn max_heat(&self) -> f64 {
        self.max_heat
    }

    pub fn headroom(&self) -> f64 {
        (self.max_heat - self.current_heat).max(0.0)
    }

    pub fn position_risk(&self, entity: &str) -> Option<f64> {
        self.positions.get(entity).copied()
    }

    fn add(&mut self, entity: &str, risk: f64) {
        *self.positions.entry(entity.to_string()).or_insert(0.0) += risk;
        self.current_heat += risk;
    }

    fn release(&mut self, entity: &str) -> f64 {
        let released = self.positions.remove(entity).unwrap_or(0.0);
        self.current_heat = (self.current_heat - released).max(0.0);
        released
    }
}

/// Market inputs the gate needs beyond the composite itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketConditions {
    pub reference_price: Option<f64>,
    /// Annualized return volatility
    pub volatility: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Admitted(Box<CompositeSignal>),
    Rejected { reason: String },
}

impl RiskDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RiskDecision::Admitted(_))
    }
}

pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        RiskManager { config }
    }

    pub fn new_portfolio_state(&self) -> PortfolioRiskState {
        PortfolioRiskState::new(self.config.max_heat_pct)
    }

    /// Risk-at-stake (and stop distance) in percent for a confidence level
    pub fn adjusted_risk_pct(&self, confidence: f64, volatility: Option<f64>) -> f64 {
        let base = if confidence >= self.config.high_confidence {
            self.config.tight_stop_pct
        } else if confidence >= self.config.low_confidence {
            self.config.normal_stop_pct
        } else {
            self.config.wide_stop_pct
        };
        if self.is_volatile(volatility) {
            base * self.config.volatility_multiplier
        } else {
            base
        }
    }

    fn is_volatile(&self, volatility: Option<f64>) -> bool {
        volatility
            .map(|v| v > self.config.volatility_threshold)
            .unwrap_or(false)
    }

    fn risk_level(&self, confidence: f64, volatile: bool) -> RiskLevel {
        if volatile || confidence <= self.config.low_confidence {
            RiskLevel::High
        } else if confidence >= self.config.high_confidence {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        }
    }

    fn urgency(&self, composite: &CompositeSignal, market: &MarketConditions) -> Urgency {
        let corroborated = composite.event_corroboration >= self.config.min_event_corroboration;
        let price_moving = match (market.price_change_pct, market.volume) {
            (Some(change), Some(volume)) => {
                change.abs() > self.config.urgent_price_move_pct && volume > 0.0
            }
            _ => false,
        };
        if corroborated || price_moving {
            Urgency::High
        } else if composite.confidence.value() >= self.config.medium_urgency_confidence {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }

    fn check_inputs(
        &self,
        composite: &CompositeSignal,
        market: &MarketConditions,
    ) -> Result<(), EngineError> {
        let numbers = [
            Some(composite.confidence.value()),
            market.reference_price,
            market.volatility,
            market.price_change_pct,
            market.volume,
        ];
        if numbers.iter().flatten().any(|v| !v.is_finite()) {
            return Err(EngineError::RiskEvaluationFailed {
                entity: composite.entity.clone(),
                reason: "non-finite market input".to_string(),
            });
        }
        Ok(())
    }

    /// Stop and target around `price`, mirrored for SELL
    fn protective_levels(
        &self,
        composite: &CompositeSignal,
        price: f64,
        stop_pct: f64,
    ) -> Result<(Price, Price, Price), EngineError> {
        let to_engine = |e: crate::domain::errors::ValidationError| EngineError::RiskEvaluationFailed {
            entity: composite.entity.clone(),
            reason: e.to_string(),
        };
        let reference = Price::new(price).map_err(to_engine)?;
        let stop = stop_pct / 100.0;
        let reward = stop * self.config.reward_to_risk;
        let (stop_factor, target_factor) = if composite.is_buy() {
            (1.0 - stop, 1.0 + reward)
        } else {
            (1.0 + stop, (1.0 - reward).max(0.0))
        };
        let stop_loss = reference.scale(stop_factor).map_err(to_engine)?;
        let target = reference.scale(target_factor).map_err(to_engine)?;
        Ok((reference, stop_loss, target))
    }

    fn evaluate(
        &self,
        mut composite: CompositeSignal,
        market: &MarketConditions,
        state: &mut PortfolioRiskState,
    ) -> Result<RiskDecision, EngineError> {
        self.check_inputs(&composite, market)?;

        let confidence = composite.confidence.value();
        let volatile = self.is_volatile(market.volatility);
        let risk_pct = self.adjusted_risk_pct(confidence, market.volatility);

        let levels = match market.reference_price.filter(|p| *p > 0.0) {
            Some(price) => Some(self.protective_levels(&composite, price, risk_pct)?),
            None => None,
        };

        if composite.is_buy() {
            let estimated = state.current_heat + risk_pct;
            if estimated > state.max_heat {
                info!(
                    entity = %composite.entity,
                    current_heat = state.current_heat,
                    adjusted_risk = risk_pct,
                    max_heat = state.max_heat,
                    "BUY dropped, portfolio heat ceiling reached"
                );
                return Ok(RiskDecision::Rejected {
                    reason: format!(
                        "portfolio heat {:.2}% + {:.2}% would exceed {:.2}%",
                        state.current_heat, risk_pct, state.max_heat
                    ),
                });
            }
            state.add(&composite.entity, risk_pct);
        } else {
            let released = state.release(&composite.entity);
            debug!(entity = %composite.entity, released = released, "SELL released position risk");
        }

        composite.risk_level = self.risk_level(confidence, volatile);
        composite.position_size_pct = self.config.max_position_size_pct * confidence;
        composite.urgency = self.urgency(&composite, market);
        if let Some((reference, stop_loss, target)) = levels {
            composite.reference_price = Some(reference);
            composite.stop_loss = Some(stop_loss);
            composite.target_price = Some(target);
        }

        info!(
            entity = %composite.entity,
            action = %composite.action,
            confidence = confidence,
            risk_pct = risk_pct,
            current_heat = state.current_heat,
            urgency = ?composite.urgency,
            "Composite admitted"
        );
        Ok(RiskDecision::Admitted(Box::new(composite)))
    }

    /// Gate one composite against the portfolio
    ///
    /// Never fails: any internal error becomes a rejection and leaves the
    /// state untouched.
    pub fn admit(
        &self,
        composite: CompositeSignal,
        market: &MarketConditions,
        state: &mut PortfolioRiskState,
    ) -> RiskDecision {
        let entity = composite.entity.clone();
        match self.evaluate(composite, market, state) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Risk evaluation failed, signal dropped");
                RiskDecision::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{SignalAction, SignalSource, TimeHorizon};
    use crate::domain::value_objects::Confidence;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn composite(entity: &str, action: SignalAction, confidence: f64) -> CompositeSignal {
        CompositeSignal {
            entity: entity.to_string(),
            action,
            confidence: Confidence::new(confidence).unwrap(),
            contributing_sources: BTreeSet::from([SignalSource::Fundamental]),
            reason: "test".to_string(),
            reasons: vec!["test".to_string()],
            risk_level: RiskLevel::Medium,
            position_size_pct: 0.0,
            reference_price: None,
            stop_loss: None,
            target_price: None,
            urgency: Urgency::Low,
            time_horizon: TimeHorizon::MediumTerm,
            buy_score: confidence,
            sell_score: 0.0,
            component_count: 1,
            event_corroboration: 0,
            generated_at: Utc::now(),
        }
    }

    fn priced(price: f64) -> MarketConditions {
        MarketConditions {
            reference_price: Some(price),
            ..Default::default()
        }
    }

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default())
    }

    fn admitted(decision: RiskDecision) -> CompositeSignal {
        match decision {
            RiskDecision::Admitted(c) => *c,
            RiskDecision::Rejected { reason } => panic!("unexpected rejection: {}", reason),
        }
    }

    #[test]
    fn test_risk_bands() {
        let rm = manager();
        assert_eq!(rm.adjusted_risk_pct(0.85, None), 3.0);
        assert_eq!(rm.adjusted_risk_pct(0.7, Some(0.2)), 5.0);
        assert_eq!(rm.adjusted_risk_pct(0.5, None), 7.0);
        assert_eq!(rm.adjusted_risk_pct(0.85, Some(0.45)), 4.5);
    }

    #[test]
    fn test_heat_ceiling_rejects_buy() {
        let rm = manager();
        let mut state = PortfolioRiskState::with_positions(
            6.0,
            BTreeMap::from([("OLD".to_string(), 5.0)]),
        );
        let decision = rm.admit(composite("NEW", SignalAction::Buy, 0.85), &priced(100.0), &mut state);

        assert!(!decision.is_admitted());
        assert_eq!(state.current_heat(), 5.0);
        assert_eq!(state.position_risk("NEW"), None);
    }

    #[test]
    fn test_buy_admitted_with_levels() {
        let rm = manager();
        let mut state = rm.new_portfolio_state();
        let c = admitted(rm.admit(composite("TCS", SignalAction::Buy, 0.85), &priced(200.0), &mut state));

        assert_eq!(state.current_heat(), 3.0);
        assert!((c.stop_loss.unwrap().value() - 194.0).abs() < 1e-9);
        assert!((c.target_price.unwrap().value() - 212.0).abs() < 1e-9);
        assert_eq!(c.reference_price.unwrap().value(), 200.0);
        assert_eq!(c.risk_level, RiskLevel::Low);
        assert!((c.position_size_pct - 4.25).abs() < 1e-9);
        assert_eq!(c.urgency, Urgency::Medium);
    }

    #[test]
    fn test_sell_always_admitted_and_releases_risk() {
        let rm = manager();
        let mut state = PortfolioRiskState::with_positions(
            6.0,
            BTreeMap::from([("TCS".to_string(), 5.0), ("INFY".to_string(), 1.0)]),
        );
        let c = admitted(rm.admit(composite("TCS", SignalAction::Sell, 0.65), &priced(100.0), &mut state));

        assert_eq!(state.current_heat(), 1.0);
        assert!((c.stop_loss.unwrap().value() - 105.0).abs() < 1e-9);
        assert!((c.target_price.unwrap().value() - 90.0).abs() < 1e-9);
        assert_eq!(c.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_no_price_admits_without_levels() {
        let rm = manager();
        let mut state = rm.new_portfolio_state();
        let c = admitted(rm.admit(
            composite("TCS", SignalAction::Buy, 0.7),
            &MarketConditions::default(),
            &mut state,
        ));
        assert!(c.stop_loss.is_none());
        assert!(c.target_price.is_none());
        assert_eq!(state.current_heat(), 5.0);
    }

    #[test]
    fn test_volatility_widens_stop_and_raises_level() {
        let rm = manager();
        let mut state = PortfolioRiskState::new(20.0);
        let market = MarketConditions {
            reference_price: Some(100.0),
            volatility: Some(0.5),
            ..Default::default()
        };
        let c = admitted(rm.admit(composite("TCS", SignalAction::Buy, 0.9), &market, &mut state));
        assert_eq!(c.risk_level, RiskLevel::High);
        assert!((c.stop_loss.unwrap().value() - 95.5).abs() < 1e-9);
        assert!((state.current_heat() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_urgency_rules() {
        let rm = manager();
        let mut state = PortfolioRiskState::new(100.0);

        let mut corroborated = composite("A", SignalAction::Buy, 0.65);
        corroborated.event_corroboration = 2;
        let c = admitted(rm.admit(corroborated, &priced(10.0), &mut state));
        assert_eq!(c.urgency, Urgency::High);

        let moving = MarketConditions {
            reference_price: Some(10.0),
            price_change_pct: Some(-2.5),
            volume: Some(1000.0),
            ..Default::default()
        };
        let c = admitted(rm.admit(composite("B", SignalAction::Buy, 0.65), &moving, &mut state));
        assert_eq!(c.urgency, Urgency::High);

        let no_volume = MarketConditions {
            volume: Some(0.0),
            ..moving
        };
        let c = admitted(rm.admit(composite("C", SignalAction::Buy, 0.65), &no_volume, &mut state));
        assert_eq!(c.urgency, Urgency::Low);
    }

    #[test]
    fn test_non_finite_input_is_conservative_rejection() {
        let rm = manager();
        let mut state = rm.new_portfolio_state();
        let market = MarketConditions {
            reference_price: Some(100.0),
            volatility: Some(f64::NAN),
            ..Default::default()
        };
        let decision = rm.admit(composite("TCS", SignalAction::Buy, 0.9), &market, &mut state);
        assert!(matches!(decision, RiskDecision::Rejected { ref reason } if reason.contains("risk evaluation failed")));
        assert_eq!(state.current_heat(), 0.0);
    }
}
