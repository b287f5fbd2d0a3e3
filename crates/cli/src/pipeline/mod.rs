//! Bridge orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Bridge, BridgeOptions, SourceOptions};
pub use stats::BridgeStats;
