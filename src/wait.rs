//! Polling for slow resource state transitions
//!
//! NAT gateways and VPC endpoints take minutes to delete. [`wait_until`]
//! polls a probe at a fixed interval with a bounded attempt count and reports
//! a tri-state outcome; timing out is reported, not raised, so teardown can
//! continue with the remaining resources.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed-interval polling parameters.
#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl WaitConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// 15s interval for up to 40 attempts (10 minutes), suitable for NAT
    /// gateway deletion.
    pub fn slow() -> Self {
        Self::new(Duration::from_secs(15), 40)
    }

    /// 5s interval for up to 36 attempts (3 minutes).
    pub fn fast() -> Self {
        Self::new(Duration::from_secs(5), 36)
    }
}

/// Result of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The probe reported the desired state.
    Completed,
    /// The probe reported a terminal failure state.
    Failed(String),
    /// The attempt budget ran out before a terminal state.
    TimedOut,
}

/// One probe observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Desired state reached.
    Done,
    /// Terminal failure, no point polling further.
    Failed(String),
    /// Keep polling.
    Pending,
}

/// Poll `probe` until it reports a terminal state or the budget is exhausted.
/// Probe errors propagate; they indicate the check itself is broken rather
/// than the resource being slow.
pub async fn wait_until<F, Fut>(what: &str, config: WaitConfig, probe: F) -> Result<WaitOutcome>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Probe>>,
{
    for attempt in 1..=config.max_attempts {
        match probe().await? {
            Probe::Done => {
                debug!(what = %what, attempt, "wait completed");
                return Ok(WaitOutcome::Completed);
            }
            Probe::Failed(reason) => {
                warn!(what = %what, attempt, reason = %reason, "wait hit failure state");
                return Ok(WaitOutcome::Failed(reason));
            }
            Probe::Pending => {
                debug!(what = %what, attempt, max = config.max_attempts, "still pending");
            }
        }
        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }
    warn!(what = %what, attempts = config.max_attempts, "wait timed out");
    Ok(WaitOutcome::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> WaitConfig {
        WaitConfig::new(Duration::from_millis(1), max_attempts)
    }

    #[tokio::test]
    async fn completes_when_probe_reports_done() {
        let attempts = AtomicU32::new(0);
        let outcome = wait_until("test", quick(5), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(Probe::Pending)
            } else {
                Ok(Probe::Done)
            }
        })
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Completed);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failure_stops_polling() {
        let outcome = wait_until("test", quick(5), || async {
            Ok(Probe::Failed("resource entered failed state".into()))
        })
        .await
        .unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::Failed("resource entered failed state".into())
        );
    }

    #[tokio::test]
    async fn budget_exhaustion_times_out() {
        let outcome = wait_until("test", quick(3), || async { Ok(Probe::Pending) })
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn probe_errors_propagate() {
        let result = wait_until("test", quick(3), || async {
            Err::<Probe, _>(anyhow::anyhow!("describe call failed"))
        })
        .await;
        assert!(result.is_err());
    }
}
