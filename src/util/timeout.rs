//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::TroupeError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, TroupeError>>,
) -> Result<T, TroupeError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TroupeError::Timeout(duration.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_timeout_error_when_deadline_passes() {
        let fut = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, TroupeError>(1)
        });
        let result = fut.await;
        assert!(matches!(result, Err(TroupeError::Timeout(50))));
    }

    #[tokio::test]
    async fn passes_through_inner_result() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok::<_, TroupeError>(42) }).await;
        assert_eq!(ok.unwrap(), 42);
    }
}
