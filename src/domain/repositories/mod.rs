//! Ports to the collaborating subsystems
//!
//! The engine only reads market, fundamental and event data through these
//! traits, and hands its decisions to the sinks. Decoupling them lets every
//! collector be exercised with in-memory fakes.

pub mod event_store;
pub mod fundamental_store;
pub mod indicator_engine;
pub mod market_data;
pub mod sinks;

pub use event_store::{EventStore, EventWindow};
pub use fundamental_store::FundamentalStore;
pub use indicator_engine::{IndicatorSnapshot, TechnicalIndicatorEngine};
pub use market_data::MarketDataProvider;
pub use sinks::{NotificationSink, SignalSink};
