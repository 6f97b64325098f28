use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use factor_core::{ProviderStats, Table, UpstreamError, UpstreamSubstrate};

use crate::registry::{ProviderConfig, ProviderHandle};
use crate::retry::with_retry;

type CallArgs = factor_core::CallArgs;

/// The concrete §4.1 substrate: one mediated entry point for every upstream
/// HTTP call, fronting per-provider rate limiting, circuit breaking, retry
/// and (where configured) key rotation.
pub struct HttpSubstrate {
    client: Client,
    providers: HashMap<String, Arc<ProviderHandle>>,
}

impl HttpSubstrate {
    pub fn new(configs: Vec<(ProviderConfig, Vec<String>)>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        let providers = configs
            .into_iter()
            .map(|(config, keys)| (config.name.clone(), Arc::new(ProviderHandle::new(config, keys))))
            .collect();

        Self { client, providers }
    }

    fn handle(&self, provider: &str) -> Result<&Arc<ProviderHandle>, UpstreamError> {
        self.providers
            .get(provider)
            .ok_or_else(|| UpstreamError::InvalidArgument(format!("unknown provider '{provider}'")))
    }

    async fn do_request(&self, handle: &ProviderHandle, function: &str, args: &CallArgs, auth: Option<&str>) -> Result<Table, UpstreamError> {
        let url = format!("{}/{}", handle.config.base_url.trim_end_matches('/'), function);
        let mut query: Vec<(String, String)> = args
            .iter()
            .map(|(k, v)| (k.clone(), value_to_query_string(v)))
            .collect();
        if let Some(token) = auth {
            query.push(("token".to_string(), token.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if status.as_u16() == 404 {
            return Err(UpstreamError::NotFound);
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::InvalidArgument(format!("HTTP {status}: {body}")));
        }
        if status.is_server_error() {
            return Err(UpstreamError::Transient(format!("HTTP {status}")));
        }

        response.json::<Table>().await.map_err(|e| UpstreamError::Transient(e.to_string()))
    }

    /// §4.1 multi-key rotation: on a usage-limit error the key is dropped
    /// from the pool and the call retried with the next one, until a key
    /// succeeds, a non-usage-limit error surfaces, or the pool empties
    /// (`NoKeyAvailable`).
    async fn call_with_key_rotation(&self, handle: &ProviderHandle, pool: &crate::KeyPool, function: &str, args: &CallArgs) -> Result<Table, UpstreamError> {
        loop {
            let key = pool.acquire().await?;
            let result = with_retry(|| self.do_request(handle, function, args, Some(&key))).await;
            match result {
                Ok(table) => {
                    pool.release_success(key).await;
                    return Ok(table);
                }
                Err(UpstreamError::RateLimited) => {
                    pool.release_failure(key).await;
                }
                Err(err) => {
                    pool.release_success(key).await;
                    return Err(err);
                }
            }
        }
    }
}

fn value_to_query_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl UpstreamSubstrate for HttpSubstrate {
    async fn call(&self, provider: &str, function: &str, args: CallArgs, deadline: Duration) -> Result<Table, UpstreamError> {
        let handle = self.handle(provider)?.clone();

        handle.rate_limiter.acquire(deadline).await?;

        let permit = handle.breaker.admit().await?;

        let result = match &handle.key_pool {
            Some(pool) => self.call_with_key_rotation(&handle, pool, function, &args).await,
            None => with_retry(|| self.do_request(&handle, function, &args, handle.config.token.as_deref())).await,
        };

        handle.breaker.record(permit, result.is_ok()).await;

        result
    }

    async fn stats(&self, provider: &str) -> Option<ProviderStats> {
        let handle = self.providers.get(provider)?;
        let calls_in_window = handle.rate_limiter.calls_in_window().await;
        let effective_limit = handle.rate_limiter.effective_limit();
        let breaker_state = handle.breaker.state().await;
        Some(ProviderStats {
            provider: provider.to_string(),
            tier: handle.config.tier_points.to_string(),
            effective_limit,
            calls_in_window,
            utilization: if effective_limit == 0 { 0.0 } else { calls_in_window as f64 / effective_limit as f64 },
            breaker_state,
        })
    }
}
