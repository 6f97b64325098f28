use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::MissedTickBehavior;

use daily_computer::DailyComputer;
use factor_core::{FundUniverse, InstrumentKind, TradeDate, UpstreamSubstrate};
use performance_tracker::PerformanceTracker;
use recommendation_engine::RecommendationEngine;

use crate::clock::DailyLatch;
use crate::config::{SchedulerConfig, TrackedEntry};

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const INDEX_QUOTE_DEADLINE: Duration = Duration::from_secs(5);

/// §5/§6: drives the three wall-clock cron jobs (daily compute, performance
/// evaluation, per-fund pre/post-market analysis) plus the periodic market
/// index refresh, all from a single minute-resolution tick loop rather than
/// a dedicated timer per job.
pub struct Scheduler {
    substrate: Arc<dyn UpstreamSubstrate>,
    provider: String,
    daily_computer: Arc<DailyComputer>,
    tracker: Arc<PerformanceTracker>,
    engine: Arc<RecommendationEngine>,
    tracked: Vec<TrackedEntry>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        substrate: Arc<dyn UpstreamSubstrate>,
        provider: impl Into<String>,
        daily_computer: Arc<DailyComputer>,
        tracker: Arc<PerformanceTracker>,
        engine: Arc<RecommendationEngine>,
        tracked: Vec<TrackedEntry>,
        config: SchedulerConfig,
    ) -> Self {
        Self { substrate, provider: provider.into(), daily_computer, tracker, engine, tracked, config }
    }

    /// Runs forever. Each tick (every minute) checks every wall-clock
    /// trigger against the current local time; a 5-minute index refresh
    /// rides on every 5th tick rather than its own timer.
    pub async fn run(&self) -> ! {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut daily_compute_latch = DailyLatch::new();
        let mut performance_eval_latch = DailyLatch::new();
        let mut pre_market_latches: HashMap<String, DailyLatch> = HashMap::new();
        let mut post_market_latches: HashMap<String, DailyLatch> = HashMap::new();
        let mut ticks_since_index_refresh = 0u32;
        let index_refresh_ticks = (self.config.indices_refresh_interval_secs / TICK_INTERVAL.as_secs()).max(1) as u32;

        loop {
            tick.tick().await;
            let now = Local::now();

            if daily_compute_latch.should_fire(now, self.config.daily_compute_time) {
                self.run_daily_compute().await;
            }
            if performance_eval_latch.should_fire(now, self.config.performance_eval_time) {
                self.run_performance_eval().await;
            }
            for entry in &self.tracked {
                if let Some(target) = entry.pre_market_hm() {
                    let latch = pre_market_latches.entry(entry.code.clone()).or_default();
                    if latch.should_fire(now, target) {
                        self.run_tracked_analysis(entry, "pre").await;
                    }
                }
                if let Some(target) = entry.post_market_hm() {
                    let latch = post_market_latches.entry(entry.code.clone()).or_default();
                    if latch.should_fire(now, target) {
                        self.run_tracked_analysis(entry, "post").await;
                    }
                }
            }

            ticks_since_index_refresh += 1;
            if ticks_since_index_refresh >= index_refresh_ticks {
                ticks_since_index_refresh = 0;
                self.refresh_indices().await;
            }
        }
    }

    async fn run_daily_compute(&self) {
        tracing::info!("cron: starting daily factor computation");
        if let Err(err) = self.daily_computer.start(InstrumentKind::Stock, None, None).await {
            tracing::warn!(%err, "daily factor computation (stock) failed to start");
        }
        if let Err(err) = self.daily_computer.start(InstrumentKind::Fund, None, Some(FundUniverse::Tracked)).await {
            tracing::warn!(%err, "daily factor computation (fund) failed to start");
        }
    }

    async fn run_performance_eval(&self) {
        tracing::info!("cron: evaluating pending recommendation performance");
        let as_of = TradeDate::from_naive(Local::now().date_naive());
        if let Err(err) = self.tracker.evaluate_pending(self.substrate.as_ref(), &self.provider, as_of).await {
            tracing::warn!(%err, "performance evaluation pass failed");
        }
    }

    async fn run_tracked_analysis(&self, entry: &TrackedEntry, phase: &'static str) {
        let as_of = TradeDate::from_naive(Local::now().date_naive());
        tracing::info!(code = %entry.code, phase, "running tracked-fund analysis");
        match self.engine.analyze(entry.kind, &entry.code, as_of).await {
            Ok(Some((short, long))) => {
                tracing::info!(code = %entry.code, phase, ?short, ?long, "tracked-fund analysis complete");
            }
            Ok(None) => {
                tracing::warn!(code = %entry.code, phase, "no stored factor row for tracked fund yet");
            }
            Err(err) => {
                tracing::warn!(code = %entry.code, phase, %err, "tracked-fund analysis failed");
            }
        }
    }

    /// Best-effort market-index cache warm, mirroring the dashboard cache
    /// refresh job this scheduler is grounded on. A failure here never
    /// blocks the other jobs.
    async fn refresh_indices(&self) {
        let args = serde_json::Map::new();
        match self.substrate.call(&self.provider, "market_index_quotes", args, INDEX_QUOTE_DEADLINE).await {
            Ok(table) => tracing::debug!(rows = table.rows.len(), "refreshed market index quotes"),
            Err(err) => tracing::debug!(%err, "market index refresh skipped"),
        }
    }
}
