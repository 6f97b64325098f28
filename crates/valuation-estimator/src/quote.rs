use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::json;

use factor_core::coerce::to_float;
use factor_core::UpstreamSubstrate;

const CALL_DEADLINE: Duration = Duration::from_secs(5);
const UNAVAILABLE_SKIP: Duration = Duration::from_secs(300);

/// Two-provider realtime quote waterfall: try the free provider first, fall
/// to the metered one. A provider that just failed is skipped for 5
/// minutes rather than retried on every call (§4.9).
pub struct RealtimeQuoteFetcher {
    substrate: std::sync::Arc<dyn UpstreamSubstrate>,
    free_provider: String,
    metered_provider: String,
    unavailable_until: Mutex<HashMap<String, Instant>>,
}

impl RealtimeQuoteFetcher {
    pub fn new(substrate: std::sync::Arc<dyn UpstreamSubstrate>, free_provider: impl Into<String>, metered_provider: impl Into<String>) -> Self {
        Self {
            substrate,
            free_provider: free_provider.into(),
            metered_provider: metered_provider.into(),
            unavailable_until: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fetch(&self, code: &str) -> Option<f64> {
        for provider in [self.free_provider.clone(), self.metered_provider.clone()] {
            if self.is_skipped(&provider) {
                continue;
            }
            match self.call_quote(&provider, code).await {
                Some(price) => return Some(price),
                None => self.mark_unavailable(&provider),
            }
        }
        None
    }

    async fn call_quote(&self, provider: &str, code: &str) -> Option<f64> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        let table = self.substrate.call(provider, "realtime_quote", args, CALL_DEADLINE).await.ok()?;
        let idx = table.column_index("price")?;
        table.rows.first().and_then(|row| row.get(idx)).and_then(to_float)
    }

    fn is_skipped(&self, provider: &str) -> bool {
        let guard = self.unavailable_until.lock().unwrap();
        guard.get(provider).map(|until| Instant::now() < *until).unwrap_or(false)
    }

    fn mark_unavailable(&self, provider: &str) {
        let mut guard = self.unavailable_until.lock().unwrap();
        guard.insert(provider.to_string(), Instant::now() + UNAVAILABLE_SKIP);
    }
}
