pub mod event;
pub mod fundamentals;
pub mod market;
pub mod priority;
pub mod signal;

pub use event::{CorporateEvent, EventType, ImpactLevel};
pub use fundamentals::{
    EarningsSurprise, FundamentalScore, GrowthSnapshot, MarketCapTier, MomentumTrend,
    ValuationSnapshot,
};
pub use market::{Candle, Quote, Timeframe};
pub use priority::{PriorityCategory, PriorityScore};
pub use signal::{
    CompositeSignal, RiskLevel, SignalAction, SignalCandidate, SignalSource, TimeHorizon, Urgency,
};
