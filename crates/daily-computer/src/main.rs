//! daily-computer: runs one `(kind, trade_date)` factor computation pass
//! against the configured upstream provider and factor store.
//!
//! Usage:
//!   daily-computer --kind stock
//!   daily-computer --kind fund --universe tracked
//!   daily-computer --kind stock --trade-date 20260128

use std::sync::Arc;
use std::time::Duration;

use daily_computer::DailyComputer;
use factor_core::{FundUniverse, InstrumentKind, TradeDate};
use factor_store::FactorStore;
use upstream_client::{HttpSubstrate, ProviderConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "daily_computer=info".into()))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let kind = args
        .iter()
        .position(|a| a == "--kind")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .and_then(|s| match s {
            "stock" => Some(InstrumentKind::Stock),
            "fund" => Some(InstrumentKind::Fund),
            _ => None,
        })
        .unwrap_or(InstrumentKind::Stock);

    let trade_date = args
        .iter()
        .position(|a| a == "--trade-date")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| TradeDate::parse_yyyymmdd(s));

    let universe = args
        .iter()
        .position(|a| a == "--universe")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| FundUniverse::parse(s));

    let provider_name = std::env::var("UPSTREAM_PROVIDER").unwrap_or_else(|_| "tushare".to_string());
    let base_url = std::env::var("UPSTREAM_BASE_URL").unwrap_or_else(|_| "https://api.tushare.pro".to_string());
    let tier_points: u32 = std::env::var("UPSTREAM_TIER_POINTS").ok().and_then(|v| v.parse().ok()).unwrap_or(2000);
    let token = std::env::var("UPSTREAM_TOKEN").ok();

    let mut config = ProviderConfig::new(provider_name.as_str(), base_url.as_str(), tier_points)
        .with_breaker(5, Duration::from_secs(60), Duration::from_secs(30));
    if let Some(token) = token {
        config = config.with_token(token);
    }

    let substrate = Arc::new(HttpSubstrate::new(vec![(config, Vec::new())]));

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:factor_store.db?mode=rwc".to_string());
    let store = Arc::new(FactorStore::connect(&database_url).await?);

    let daily_computer = DailyComputer::new(substrate, store, provider_name);

    tracing::info!(?kind, ?trade_date, "starting daily factor computation");
    daily_computer.start(kind, trade_date, universe).await?;

    let progress = daily_computer.progress().await;
    tracing::info!(
        total = progress.total,
        completed = progress.completed,
        failed = progress.failed,
        status = ?progress.status,
        "daily factor computation finished"
    );

    Ok(())
}
