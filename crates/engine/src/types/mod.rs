pub mod combiner;
pub mod divergence;
pub mod market_data;
pub mod regime;
pub mod result;
pub mod retracement;
pub mod risk;
pub mod signal;
pub mod structure;
pub mod swing;
pub mod timeframe;

pub use combiner::*;
pub use divergence::*;
pub use market_data::*;
pub use regime::*;
pub use result::*;
pub use retracement::*;
pub use risk::*;
pub use signal::*;
pub use structure::*;
pub use swing::*;
pub use timeframe::*;
