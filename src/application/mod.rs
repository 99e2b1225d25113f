//! Application layer: the cycle driver and the actor that serializes it

pub mod actors;
pub mod orchestrator;

pub use actors::{CycleActor, CycleHandle};
pub use orchestrator::{CycleOrchestrator, CycleReport, DataPorts, EntityOutcome, OutputSinks};
