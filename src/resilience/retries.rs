//! Bounded retry loop.

use std::fmt::Display;
use std::future::Future;

use crate::resilience::backoff::ExponentialBackoff;

/// Run `op` up to `max_attempts` times, sleeping with backoff between failures.
///
/// Returns the first success or the last error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    policy: ExponentialBackoff,
    mut op: F,
) -> Result<T, (u32, E)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err((attempt, e)),
            Err(e) => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay = ?delay,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, (u32, String)> =
            retry_with_backoff(5, ExponentialBackoff::new(1, 1), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("fail {n}"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), (u32, &str)> =
            retry_with_backoff(3, ExponentialBackoff::new(1, 1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down")
            })
            .await;

        assert_eq!(result.unwrap_err(), (3, "down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
