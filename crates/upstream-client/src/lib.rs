pub mod breaker;
pub mod client;
pub mod key_pool;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use breaker::{BreakerPermit, CircuitBreaker};
pub use client::HttpSubstrate;
pub use key_pool::KeyPool;
pub use rate_limiter::RateLimiter;
pub use registry::{ProviderConfig, ProviderHandle};
