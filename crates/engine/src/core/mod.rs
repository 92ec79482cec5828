pub mod analyzer;
pub mod baseline;
pub mod divergence_detector;
pub mod indicators;
pub mod orchestrator;
pub mod regime_detector;
pub mod retracement_analyzer;
pub mod ring_buffer;
pub mod risk_sizer;
pub mod runner;
pub mod signal_combiner;
pub mod structure_analyzer;
pub mod swings;
