use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use factor_core::{BreakerState, UpstreamError};

struct Inner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open_inflight: bool,
}

/// Per-provider circuit breaker, §4.1. `closed` counts failures in a rolling
/// window; at `failure_threshold` it opens. `open` fails fast until
/// `open_duration` elapses, then admits a single `half_open` probe.
pub struct CircuitBreaker {
    failure_threshold: u32,
    window: Duration,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

/// Held by a caller that was admitted through the breaker; `record` must be
/// called exactly once with the call's outcome.
pub struct BreakerPermit {
    pub is_probe: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, window: Duration, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            window,
            open_duration,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                half_open_inflight: false,
            }),
        }
    }

    pub async fn admit(&self) -> Result<BreakerPermit, UpstreamError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => Ok(BreakerPermit { is_probe: false }),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.open_duration {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_inflight = true;
                    Ok(BreakerPermit { is_probe: true })
                } else {
                    Err(UpstreamError::Unavailable("circuit open".to_string()))
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_inflight {
                    Err(UpstreamError::Unavailable("circuit half-open, probe in flight".to_string()))
                } else {
                    inner.half_open_inflight = true;
                    Ok(BreakerPermit { is_probe: true })
                }
            }
        }
    }

    pub async fn record(&self, permit: BreakerPermit, success: bool) {
        let mut inner = self.inner.lock().await;
        if permit.is_probe {
            inner.half_open_inflight = false;
            if success {
                inner.state = BreakerState::Closed;
                inner.failures.clear();
                inner.opened_at = None;
            } else {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            return;
        }

        if success {
            return;
        }

        let now = Instant::now();
        inner.failures.push_back(now);
        while let Some(&front) = inner.failures.front() {
            if now.duration_since(front) > self.window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
        if inner.failures.len() as u32 >= self.failure_threshold {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_and_fast_fails() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60), Duration::from_millis(100));
        for _ in 0..5 {
            let permit = breaker.admit().await.unwrap();
            breaker.record(permit, false).await;
        }
        assert_eq!(breaker.state().await, BreakerState::Open);
        assert!(matches!(breaker.admit().await, Err(UpstreamError::Unavailable(_))));
    }

    #[tokio::test]
    async fn half_open_probe_recovers_to_closed() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60), Duration::from_millis(20));
        for _ in 0..2 {
            let permit = breaker.admit().await.unwrap();
            breaker.record(permit, false).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let permit = breaker.admit().await.unwrap();
        assert!(permit.is_probe);
        breaker.record(permit, true).await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }
}
