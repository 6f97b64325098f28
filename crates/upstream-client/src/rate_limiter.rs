use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use factor_core::UpstreamError;

/// Sliding-window token bucket: at most `effective_limit` calls admitted in
/// any trailing 60s window. Callers block (cooperatively) until a slot opens
/// or the call's deadline fires.
#[derive(Clone)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    effective_limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(effective_limit: u32, window: Duration) -> Self {
        Self { timestamps: Arc::new(Mutex::new(VecDeque::new())), effective_limit, window }
    }

    /// `floor(raw_limit_cpm * safety_margin)`, per §4.1.
    pub fn from_tier(tier_points: u32, safety_margin: f64) -> Self {
        let raw_cpm = tier_points as f64 / 10.0;
        let effective = (raw_cpm * safety_margin).floor().max(1.0) as u32;
        Self::new(effective, Duration::from_secs(60))
    }

    pub async fn acquire(&self, deadline: Duration) -> Result<(), UpstreamError> {
        let started = Instant::now();
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.effective_limit as usize {
                ts.push_back(now);
                return Ok(());
            }

            let wait_until = *ts.front().unwrap() + self.window;
            drop(ts);

            if now.duration_since(started) >= deadline {
                return Err(UpstreamError::Deadline);
            }

            let remaining_budget = deadline.saturating_sub(now.duration_since(started));
            let sleep_for = wait_until.saturating_duration_since(now).min(remaining_budget);
            if sleep_for.is_zero() {
                return Err(UpstreamError::Deadline);
            }
            tokio::time::sleep(sleep_for).await;
        }
    }

    pub async fn calls_in_window(&self) -> u32 {
        let mut ts = self.timestamps.lock().await;
        let now = Instant::now();
        while let Some(&front) = ts.front() {
            if now.duration_since(front) >= self.window {
                ts.pop_front();
            } else {
                break;
            }
        }
        ts.len() as u32
    }

    pub fn effective_limit(&self) -> u32 {
        self.effective_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_limit_then_blocks() {
        let limiter = RateLimiter::new(3, Duration::from_millis(200));
        for _ in 0..3 {
            limiter.acquire(Duration::from_millis(10)).await.unwrap();
        }
        let err = limiter.acquire(Duration::from_millis(10)).await;
        assert!(matches!(err, Err(UpstreamError::Deadline)));
    }

    #[tokio::test]
    async fn refills_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.acquire(Duration::from_millis(10)).await.unwrap();
        limiter.acquire(Duration::from_millis(200)).await.unwrap();
    }
}
