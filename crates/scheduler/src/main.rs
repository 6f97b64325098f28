//! scheduler: long-running process driving the daily factor computation,
//! performance evaluation, and per-fund pre/post-market analysis jobs on
//! wall-clock schedules.
//!
//! Usage:
//!   scheduler
//!
//! Configuration via environment (see daily-computer for the upstream
//! provider variables this shares):
//!   TRACKED_FUNDS_FILE        path to a JSON list of tracked funds (default: tracked_funds.json)
//!   DAILY_COMPUTE_TIME        HH:MM local time (default: 08:30)
//!   PERFORMANCE_EVAL_TIME     HH:MM local time (default: 18:00)
//!   INDICES_REFRESH_SECS      seconds between index-quote refreshes (default: 300)

use std::sync::Arc;
use std::time::Duration;

use daily_computer::DailyComputer;
use factor_store::FactorStore;
use performance_tracker::PerformanceTracker;
use recommendation_engine::RecommendationEngine;
use scheduler::config::{load_tracked_entries, SchedulerConfig};
use scheduler::Scheduler;
use upstream_client::{HttpSubstrate, ProviderConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "scheduler=info".into()))
        .init();

    let provider_name = std::env::var("UPSTREAM_PROVIDER").unwrap_or_else(|_| "tushare".to_string());
    let base_url = std::env::var("UPSTREAM_BASE_URL").unwrap_or_else(|_| "https://api.tushare.pro".to_string());
    let tier_points: u32 = std::env::var("UPSTREAM_TIER_POINTS").ok().and_then(|v| v.parse().ok()).unwrap_or(2000);
    let token = std::env::var("UPSTREAM_TOKEN").ok();

    let mut provider_config = ProviderConfig::new(provider_name.as_str(), base_url.as_str(), tier_points)
        .with_breaker(5, Duration::from_secs(60), Duration::from_secs(30));
    if let Some(token) = token {
        provider_config = provider_config.with_token(token);
    }

    let substrate = Arc::new(HttpSubstrate::new(vec![(provider_config, Vec::new())]));

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:factor_store.db?mode=rwc".to_string());
    let store = Arc::new(FactorStore::connect(&database_url).await?);

    let tracker_database_url = std::env::var("PERFORMANCE_DATABASE_URL").unwrap_or_else(|_| "sqlite:performance.db?mode=rwc".to_string());
    let tracker = Arc::new(PerformanceTracker::connect(&tracker_database_url).await?);

    let daily_computer = Arc::new(DailyComputer::new(substrate.clone(), store.clone(), provider_name.clone()));
    let engine = Arc::new(RecommendationEngine::new(store, tracker.clone(), substrate.clone(), provider_name.clone(), None));

    let tracked_funds_file = std::env::var("TRACKED_FUNDS_FILE").unwrap_or_else(|_| "tracked_funds.json".to_string());
    let tracked = load_tracked_entries(&tracked_funds_file);

    let mut config = SchedulerConfig::default();
    if let Some(hm) = std::env::var("DAILY_COMPUTE_TIME").ok().and_then(|s| parse_hm(&s)) {
        config.daily_compute_time = hm;
    }
    if let Some(hm) = std::env::var("PERFORMANCE_EVAL_TIME").ok().and_then(|s| parse_hm(&s)) {
        config.performance_eval_time = hm;
    }
    if let Some(secs) = std::env::var("INDICES_REFRESH_SECS").ok().and_then(|s| s.parse().ok()) {
        config.indices_refresh_interval_secs = secs;
    }

    tracing::info!(tracked = tracked.len(), ?config, "scheduler starting");
    let scheduler = Scheduler::new(substrate, provider_name, daily_computer, tracker, engine, tracked, config);
    scheduler.run().await
}

fn parse_hm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}
