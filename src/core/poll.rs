use crate::utils::error::Result;
use std::future::Future;
use std::time::Duration;

/// Calls `probe` up to `attempts` times, sleeping `interval` in between, and
/// returns the first `Some`. Probe errors end the loop immediately.
pub async fn poll_until<T, F, Fut>(attempts: u32, interval: Duration, mut probe: F) -> Result<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 1..=attempts {
        if let Some(value) = probe(attempt).await? {
            tracing::debug!("Poll succeeded on attempt {}/{}", attempt, attempts);
            return Ok(Some(value));
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    tracing::warn!("Gave up after {} attempt(s)", attempts);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::PortalError;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_returns_first_hit() {
        let result = poll_until(5, Duration::from_millis(1), |attempt| async move {
            Ok(if attempt == 3 { Some(attempt) } else { None })
        })
        .await;
        assert_eq!(assert_ok!(result), Some(3));
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let mut calls = 0;
        let result: Result<Option<()>> = poll_until(4, Duration::from_millis(1), |_| {
            calls += 1;
            async { Ok(None) }
        })
        .await;
        assert_eq!(assert_ok!(result), None);
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_error_stops_polling() {
        let mut calls = 0;
        let result: Result<Option<()>> = poll_until(4, Duration::from_millis(1), |_| {
            calls += 1;
            async { Err(PortalError::validation("boom")) }
        })
        .await;
        assert_err!(result);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_zero_attempts() {
        let result: Result<Option<u8>> =
            poll_until(0, Duration::from_secs(60), |_| async { Ok(Some(1)) }).await;
        assert_eq!(result.unwrap(), None);
    }
}
