use std::collections::VecDeque;

use tokio::sync::Mutex;

use factor_core::UpstreamError;

/// Shared pool of API keys for the web-search provider, §4.1. A key is held
/// by at most one in-flight call; on success it rotates to the tail, on a
/// usage-limit error it is dropped from the pool entirely.
pub struct KeyPool {
    keys: Mutex<VecDeque<String>>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys: Mutex::new(keys.into_iter().collect()) }
    }

    pub async fn acquire(&self) -> Result<String, UpstreamError> {
        let mut guard = self.keys.lock().await;
        guard.pop_front().ok_or(UpstreamError::NoKeyAvailable)
    }

    pub async fn release_success(&self, key: String) {
        self.keys.lock().await.push_back(key);
    }

    /// The key is simply not returned to the queue; pool size drops by one.
    pub async fn release_failure(&self, _key: String) {}

    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rotates_to_tail_on_success() {
        let pool = KeyPool::new(vec!["a".into(), "b".into()]);
        let k = pool.acquire().await.unwrap();
        assert_eq!(k, "a");
        pool.release_success(k).await;
        let k2 = pool.acquire().await.unwrap();
        assert_eq!(k2, "b");
    }

    #[tokio::test]
    async fn shrinks_on_failure() {
        let pool = KeyPool::new(vec!["a".into(), "b".into()]);
        let k = pool.acquire().await.unwrap();
        pool.release_failure(k).await;
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn exhausted_pool_errors() {
        let pool = KeyPool::new(vec!["a".into()]);
        let k = pool.acquire().await.unwrap();
        pool.release_failure(k).await;
        assert!(matches!(pool.acquire().await, Err(UpstreamError::NoKeyAvailable)));
    }
}
