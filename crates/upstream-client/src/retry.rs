use std::time::Duration;

use rand::Rng;

use factor_core::UpstreamError;

/// Up to `N=2` retries on transient errors, exponential backoff with full
/// jitter. `NotFound` / `InvalidArgument` / `NoKeyAvailable` never retry.
pub const MAX_RETRIES: u32 = 2;

fn is_transient(err: &UpstreamError) -> bool {
    matches!(err, UpstreamError::Transient(_) | UpstreamError::RateLimited)
}

fn backoff_delay(attempt: u32, err: &UpstreamError) -> Duration {
    let base_ms: u64 = if matches!(err, UpstreamError::RateLimited) { 1000 } else { 200 };
    let cap_ms = base_ms * 2u64.pow(attempt.min(5));
    let jitter_ms = rand::thread_rng().gen_range(0..=cap_ms.max(1));
    Duration::from_millis(jitter_ms)
}

/// Runs `f` up to `MAX_RETRIES + 1` total attempts, retrying only on
/// transient errors with full-jitter exponential backoff between attempts.
pub async fn with_retry<F, Fut, T>(mut f: F) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, UpstreamError>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(err) if is_transient(&err) && attempt < MAX_RETRIES => {
                let delay = backoff_delay(attempt, &err);
                tracing::debug!(attempt, ?delay, "retrying upstream call after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(UpstreamError::Transient("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_invalid_argument() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(UpstreamError::InvalidArgument("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
