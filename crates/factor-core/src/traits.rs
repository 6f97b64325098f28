use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{CancelToken, FundFactorRow, ProviderStats, StockFactorRow, Table, TradeDate, UpstreamError};

/// Arguments passed to an upstream provider call: a flat bag of scalar params,
/// already validated by the caller (column names, date ranges, pagination).
pub type CallArgs = serde_json::Map<String, serde_json::Value>;

/// The single seam every factor computer talks through to reach external data.
/// Implementations own rate limiting, circuit breaking, retries and key
/// rotation (§4.1); callers never see provider-level detail beyond `stats`.
#[async_trait]
pub trait UpstreamSubstrate: Send + Sync {
    async fn call(
        &self,
        provider: &str,
        function: &str,
        args: CallArgs,
        deadline: Duration,
    ) -> Result<Table, UpstreamError>;

    /// Snapshot of the named provider's current rate-limit/breaker state, or
    /// `None` if the provider is unknown to this substrate.
    async fn stats(&self, provider: &str) -> Option<ProviderStats>;
}

/// Computes one or more fields of a [`StockFactorRow`] for a single code/date.
/// Per §4.3, a computer never raises on partial or missing upstream data: it
/// returns whatever fields it could fill, leaving the rest `None`. Per §5, it
/// checks `cancel` before each upstream call and returns whatever fields it
/// had already filled once the token is set, without making further calls.
#[async_trait]
pub trait StockFactorComputer: Send + Sync {
    async fn compute(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> StockFactorRow;

    fn name(&self) -> &'static str;
}

/// Computes one or more fields of a [`FundFactorRow`] for a single code/date.
/// Same never-raises and cooperative-cancellation contract as
/// [`StockFactorComputer`].
#[async_trait]
pub trait FundFactorComputer: Send + Sync {
    async fn compute(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> FundFactorRow;

    fn name(&self) -> &'static str;
}

/// Produces the composite score (and, for the recommendation path, key-factor
/// tags) from a fully merged factor row.
pub trait Scorer<Row>: Send + Sync {
    fn score(&self, row: &Row) -> Option<f64>;

    /// Chinese-language tags describing why the score landed where it did,
    /// e.g. "ROE优秀 (22.0%)". Empty when too few sub-scores are present to
    /// say anything meaningful.
    fn key_factors(&self, row: &Row) -> Vec<String>;
}

/// Anything that can report "as of" wall-clock freshness, used by health/status
/// surfaces that wrap the core (§6).
pub trait Freshness {
    fn as_of(&self) -> DateTime<Utc>;
}
