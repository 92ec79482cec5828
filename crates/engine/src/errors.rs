use thiserror::Error;

/// Typed error hierarchy for the fusion engine.
///
/// Library-internal errors use specific variants; the binary wraps with
/// `anyhow::Context` for propagation.
#[derive(Error, Debug)]
pub enum EngineError {
    // -- Input --------------------------------------------------------------
    #[error("insufficient data for {module}: need {required} candles, have {available}")]
    InsufficientData {
        module: String,
        required: usize,
        available: usize,
    },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    // -- Computation --------------------------------------------------------
    #[error("numeric degeneracy in {context}")]
    Numeric { context: String },

    #[error("analyzer {module} panicked: {reason}")]
    AnalyzerPanic { module: String, reason: String },

    #[error("analysis cycle exceeded {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn numeric(context: impl Into<String>) -> Self {
        Self::Numeric {
            context: context.into(),
        }
    }
}
