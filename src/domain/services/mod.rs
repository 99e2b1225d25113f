pub mod aggregator;
pub mod collectors;
pub mod indicators;
pub mod priority_scorer;
pub mod result_cache;
pub mod risk_manager;

pub use aggregator::SignalAggregator;
pub use collectors::{CollectionContext, CollectorSet, SignalCollector};
pub use indicators::DefaultIndicatorEngine;
pub use priority_scorer::PriorityScorer;
pub use result_cache::{CacheStats, ResultCache};
pub use risk_manager::{MarketConditions, PortfolioRiskState, RiskDecision, RiskManager};
