use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::key_pool::KeyPool;
use crate::rate_limiter::RateLimiter;

/// Declared per-provider configuration (§6 `tier_points`/`safety_margin`/
/// `failure_threshold`/`window`/`open_duration`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub tier_points: u32,
    pub safety_margin: f64,
    pub failure_threshold: u32,
    pub window: Duration,
    pub open_duration: Duration,
    pub key_rotated: bool,
    /// Static auth token, used when `key_rotated` is false.
    pub token: Option<String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, tier_points: u32) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            tier_points,
            safety_margin: 0.85,
            failure_threshold: 5,
            window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            key_rotated: false,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_breaker(mut self, failure_threshold: u32, window: Duration, open_duration: Duration) -> Self {
        self.failure_threshold = failure_threshold;
        self.window = window;
        self.open_duration = open_duration;
        self
    }

    pub fn key_rotated(mut self) -> Self {
        self.key_rotated = true;
        self
    }
}

/// A provider's live runtime state: its rate limiter, breaker, and (if
/// configured) key pool. One instance lives for the process lifetime,
/// initialised once at startup (§9 "Global mutable state").
pub struct ProviderHandle {
    pub config: ProviderConfig,
    pub rate_limiter: RateLimiter,
    pub breaker: CircuitBreaker,
    pub key_pool: Option<KeyPool>,
}

impl ProviderHandle {
    pub fn new(config: ProviderConfig, keys: Vec<String>) -> Self {
        let rate_limiter = RateLimiter::from_tier(config.tier_points, config.safety_margin);
        let breaker = CircuitBreaker::new(config.failure_threshold, config.window, config.open_duration);
        let key_pool = if config.key_rotated { Some(KeyPool::new(keys)) } else { None };
        Self { config, rate_limiter, breaker, key_pool }
    }
}
