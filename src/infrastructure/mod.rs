//! Concrete adapters for the domain ports

pub mod sinks;
pub mod snapshot;

pub use sinks::{InMemorySignalSink, LoggingNotificationSink};
pub use snapshot::{MarketSnapshot, SnapshotStore, StorePort};
