//! Async wrapper that runs analysis cycles off the runtime's worker threads.
//!
//! One orchestrator per instrument/timeframe. The orchestrator owns the only
//! mutable state (regime and trade history), so cycles on the same runner are
//! serialized through a mutex; different runners proceed independently.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info};

use super::orchestrator::Orchestrator;
use crate::errors::EngineError;
use crate::types::{AnalysisRequest, FusionResult};

#[derive(Clone)]
pub struct CycleRunner {
    orchestrator: Arc<Mutex<Orchestrator>>,
    timeout: Duration,
}

impl CycleRunner {
    pub fn new(orchestrator: Orchestrator, timeout: Duration) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            timeout,
        }
    }

    /// Shared handle, e.g. for recording closed trades between cycles.
    pub fn orchestrator(&self) -> Arc<Mutex<Orchestrator>> {
        Arc::clone(&self.orchestrator)
    }

    /// Run one cycle on the blocking pool under the wall-clock timeout.
    ///
    /// On timeout the cycle keeps running to completion in the background;
    /// its result is discarded.
    pub async fn run(&self, request: AnalysisRequest) -> Result<FusionResult, EngineError> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let symbol = request.symbol.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = orchestrator.lock().map_err(|_| EngineError::AnalyzerPanic {
                module: "orchestrator".to_string(),
                reason: "lock poisoned by an earlier cycle".to_string(),
            })?;
            guard.analyze(&request)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => {
                if let Ok(r) = &result {
                    info!(symbol = %symbol, signal = r.signal.as_str(), "cycle finished");
                }
                result
            }
            Ok(Err(join_err)) => {
                error!(symbol = %symbol, error = %join_err, "cycle task failed");
                Err(EngineError::AnalyzerPanic {
                    module: "orchestrator".to_string(),
                    reason: join_err.to_string(),
                })
            }
            Err(_) => {
                error!(symbol = %symbol, timeout_secs = self.timeout.as_secs(), "cycle timed out");
                Err(EngineError::Timeout {
                    timeout_seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::config::FusionConfig;
    use crate::types::{Candle, FirstLineInputs, Timeframe, TradeAction};

    fn request(n: usize) -> AnalysisRequest {
        AnalysisRequest {
            symbol: "GBPUSD".to_string(),
            timeframe: Timeframe::M15,
            candles: (0..n)
                .map(|i| Candle {
                    timestamp: i as i64,
                    open: dec!(1.25),
                    high: dec!(1.26),
                    low: dec!(1.24),
                    close: dec!(1.25),
                    volume: dec!(10),
                    interval: Timeframe::M15,
                })
                .collect(),
            market_data: Vec::new(),
            capital: dec!(5000),
            first_line: FirstLineInputs::default(),
            pattern: None,
        }
    }

    fn runner(timeout: Duration) -> CycleRunner {
        CycleRunner::new(Orchestrator::new(&FusionConfig::default()).unwrap(), timeout)
    }

    #[tokio::test]
    async fn test_cycle_completes_within_timeout() {
        let r = runner(Duration::from_secs(30));
        let result = r.run(request(80)).await.unwrap();
        assert_eq!(result.symbol, "GBPUSD");
        assert!(result.confidence >= Decimal::ZERO && result.confidence <= dec!(1));
    }

    #[tokio::test]
    async fn test_short_window_still_returns_hold() {
        let r = runner(Duration::from_secs(30));
        let result = r.run(request(5)).await.unwrap();
        assert_eq!(result.signal, TradeAction::Hold);
    }

    #[tokio::test]
    async fn test_zero_timeout_reports_timeout() {
        let r = runner(Duration::ZERO);
        let err = r.run(request(500)).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { timeout_seconds: 0 }));
    }

    #[tokio::test]
    async fn test_runner_state_is_shared_between_clones() {
        let r = runner(Duration::from_secs(30));
        let clone = r.clone();
        r.run(request(80)).await.unwrap();
        clone.run(request(80)).await.unwrap();
        let orchestrator = r.orchestrator();
        let guard = orchestrator.lock().unwrap();
        assert_eq!(guard.regime_detector().history().len(), 2);
    }
}
