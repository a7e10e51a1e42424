//! Bounded retry for throttled AWS calls
//!
//! Only throttling errors are retried. Everything else, including dependency
//! violations, surfaces immediately so the caller can react.

use crate::aws::error::{classify_anyhow_error, AwsError};
use anyhow::Result;
use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run an AWS call, retrying with exponential backoff while AWS reports
/// throttling. `operation` names the call in retry logs.
pub async fn retry_throttled<T, F, Fut>(operation: &str, call: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    call.retry(
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30))
            .with_max_times(5),
    )
    .when(|err| {
        matches!(
            classify_anyhow_error(err, "", ""),
            AwsError::Throttled { .. }
        )
    })
    .notify(|err, delay| {
        warn!(
            operation = %operation,
            delay_secs = delay.as_secs(),
            error = %err,
            "throttled, retrying"
        );
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn success_is_returned_without_retry() {
        let calls = AtomicUsize::new(0);
        let result = retry_throttled("noop", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_throttling_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_throttled("delete", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("code: Some(\"DependencyViolation\") boom"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn throttling_is_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result = retry_throttled("describe", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("code: Some(\"Throttling\") slow down"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
