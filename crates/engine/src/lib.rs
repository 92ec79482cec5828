//! Signal-fusion engine: five leaf analyzers, a second-line combiner and an
//! orchestrator that fuses them into one sized trade decision per cycle.

pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod logging;
pub mod types;
