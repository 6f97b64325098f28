use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use factor_core::{
    CancelToken, CoreError, CoreResult, FundFactorComputer, FundUniverse, InstrumentKind, Progress, RunStatus,
    Scorer, StockFactorComputer, StockFactorRow, FundFactorRow, TradeDate, UpstreamSubstrate,
};
use factor_store::{FactorRow, FactorStore};
use fund_factors::FundPerformanceComputer;
use fundamental_factors::FundamentalFactorComputer;
use sentiment_factors::SentimentFactorComputer;
use strategy_scorers::{FundAlphaScorer, FundMomentumScorer, LongTermStockScorer, ShortTermStockScorer};
use technical_factors::TechnicalFactorComputer;

use crate::universe::{list_fund_codes, list_stock_codes, resolve_trade_date};

const BATCH_SIZE: usize = 100;
const WORKERS: usize = 4;
const KEEP_DATES: i64 = 30;
const RUN_DEADLINE: Duration = Duration::from_secs(2 * 3600);

/// §4.5 Daily Computer: for a given `(kind, trade_date)`, ensures every
/// instrument in the active universe has a FactorRow (or a recorded
/// failure) in the Factor Store.
pub struct DailyComputer {
    substrate: Arc<dyn UpstreamSubstrate>,
    store: Arc<FactorStore>,
    provider: String,

    technical: Arc<TechnicalFactorComputer>,
    fundamental: Arc<FundamentalFactorComputer>,
    sentiment: Arc<SentimentFactorComputer>,
    fund_performance: Arc<FundPerformanceComputer>,

    short_stock_scorer: Arc<ShortTermStockScorer>,
    long_stock_scorer: Arc<LongTermStockScorer>,
    fund_momentum_scorer: Arc<FundMomentumScorer>,
    fund_alpha_scorer: Arc<FundAlphaScorer>,

    running: AtomicBool,
    cancelled: AtomicBool,
    cancel_token: CancelToken,
    progress: Mutex<Progress>,
}

impl DailyComputer {
    pub fn new(substrate: Arc<dyn UpstreamSubstrate>, store: Arc<FactorStore>, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        Self {
            technical: Arc::new(TechnicalFactorComputer::new(substrate.clone(), provider.clone())),
            fundamental: Arc::new(FundamentalFactorComputer::new(substrate.clone(), provider.clone())),
            sentiment: Arc::new(SentimentFactorComputer::new(substrate.clone(), provider.clone())),
            fund_performance: Arc::new(FundPerformanceComputer::new(substrate.clone(), provider.clone())),
            short_stock_scorer: Arc::new(ShortTermStockScorer::new()),
            long_stock_scorer: Arc::new(LongTermStockScorer::new()),
            fund_momentum_scorer: Arc::new(FundMomentumScorer::new()),
            fund_alpha_scorer: Arc::new(FundAlphaScorer::new()),
            substrate,
            store,
            provider,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            cancel_token: CancelToken::new(),
            progress: Mutex::new(Progress::default()),
        }
    }

    pub async fn progress(&self) -> Progress {
        self.progress.lock().await.clone()
    }

    /// Signals in-flight workers to stop before their next upstream call.
    /// Already-persisted batches are retained.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_token.cancel();
    }

    pub async fn start(&self, kind: InstrumentKind, trade_date: Option<TradeDate>, universe: Option<FundUniverse>) -> CoreResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CoreError::Busy);
        }
        self.cancelled.store(false, Ordering::SeqCst);
        self.cancel_token.reset();

        let result = self.run(kind, trade_date, universe).await;

        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run(&self, kind: InstrumentKind, trade_date: Option<TradeDate>, universe: Option<FundUniverse>) -> CoreResult<()> {
        let trade_date = match trade_date {
            Some(d) => d,
            None => resolve_trade_date(self.substrate.as_ref(), &self.provider).await,
        };

        let codes = match kind {
            InstrumentKind::Stock => list_stock_codes(self.substrate.as_ref(), &self.provider).await,
            InstrumentKind::Fund => {
                list_fund_codes(self.substrate.as_ref(), &self.provider, universe.unwrap_or(FundUniverse::Tracked)).await
            }
        };

        {
            let mut progress = self.progress.lock().await;
            *progress = Progress { total: codes.len(), completed: 0, failed: 0, current_batch: 0, status: RunStatus::Running };
        }

        let deadline = Instant::now() + RUN_DEADLINE;
        let mut final_status = RunStatus::Completed;

        'batches: for (batch_idx, batch) in codes.chunks(BATCH_SIZE).enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                final_status = RunStatus::Cancelled;
                break 'batches;
            }
            if Instant::now() >= deadline {
                final_status = RunStatus::Error;
                break 'batches;
            }

            {
                let mut progress = self.progress.lock().await;
                progress.current_batch = batch_idx + 1;
            }

            let rows = self.compute_batch(kind, batch, trade_date).await;

            // Persist serially to avoid write contention (§4.5 step 5).
            for row in rows {
                match row {
                    Some(row) => {
                        let _ = self.store.put_factor(row).await;
                        let mut progress = self.progress.lock().await;
                        progress.completed += 1;
                    }
                    None => {
                        let mut progress = self.progress.lock().await;
                        progress.failed += 1;
                    }
                }
            }
        }

        self.store.clear_for_date(kind, trade_date);
        let _ = self.store.prune(KEEP_DATES).await;

        {
            let mut progress = self.progress.lock().await;
            progress.status = final_status;
        }

        Ok(())
    }

    /// Runs a bounded worker pool (`W=4`) over one batch and returns one
    /// `Option<FactorRow>` per instrument, preserving batch order.
    async fn compute_batch(&self, kind: InstrumentKind, batch: &[String], trade_date: TradeDate) -> Vec<Option<FactorRow>> {
        let mut results = vec![None; batch.len()];
        let mut pending: Vec<(usize, String)> = batch.iter().cloned().enumerate().collect();
        pending.reverse();

        let mut in_flight: JoinSet<(usize, Option<FactorRow>)> = JoinSet::new();

        while !pending.is_empty() || !in_flight.is_empty() {
            while in_flight.len() < WORKERS {
                let Some((idx, code)) = pending.pop() else { break };
                if self.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                let computer = self.clone_handles();
                let cancel = self.cancel_token.clone();
                in_flight.spawn(async move {
                    let row = computer.compute_one(kind, &code, trade_date, &cancel).await;
                    (idx, row)
                });
            }

            let Some(joined) = in_flight.join_next().await else { break };
            if let Ok((idx, row)) = joined {
                results[idx] = row;
            }
        }

        results
    }

    /// Cheap clone of the `Arc`-backed computers/scorers this batch worker
    /// needs, so each spawned task owns its handles independently.
    fn clone_handles(&self) -> ComputeHandles {
        ComputeHandles {
            technical: self.technical.clone(),
            fundamental: self.fundamental.clone(),
            sentiment: self.sentiment.clone(),
            fund_performance: self.fund_performance.clone(),
            short_stock_scorer: self.short_stock_scorer.clone(),
            long_stock_scorer: self.long_stock_scorer.clone(),
            fund_momentum_scorer: self.fund_momentum_scorer.clone(),
            fund_alpha_scorer: self.fund_alpha_scorer.clone(),
        }
    }

}

/// Per-task handle bundle: every factor computer and scorer a worker needs,
/// cloned cheaply (`Arc`) so it can be moved into a spawned task.
struct ComputeHandles {
    technical: Arc<TechnicalFactorComputer>,
    fundamental: Arc<FundamentalFactorComputer>,
    sentiment: Arc<SentimentFactorComputer>,
    fund_performance: Arc<FundPerformanceComputer>,
    short_stock_scorer: Arc<ShortTermStockScorer>,
    long_stock_scorer: Arc<LongTermStockScorer>,
    fund_momentum_scorer: Arc<FundMomentumScorer>,
    fund_alpha_scorer: Arc<FundAlphaScorer>,
}

impl ComputeHandles {
    async fn compute_one(&self, kind: InstrumentKind, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> Option<FactorRow> {
        match kind {
            InstrumentKind::Stock => self.compute_stock(code, trade_date, cancel).await,
            InstrumentKind::Fund => self.compute_fund(code, trade_date, cancel).await,
        }
    }

    async fn compute_stock(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> Option<FactorRow> {
        let (technical, fundamental, sentiment) = tokio::join!(
            self.technical.compute(code, trade_date, cancel),
            self.fundamental.compute(code, trade_date, cancel),
            self.sentiment.compute(code, trade_date, cancel),
        );

        let mut row = StockFactorRow::empty(code, trade_date);
        row.merge_from(&technical);
        row.merge_from(&fundamental);
        row.merge_from(&sentiment);

        row.short_term_score = self.short_stock_scorer.score(&row);
        row.long_term_score = self.long_stock_scorer.score(&row);

        Some(FactorRow::Stock(row))
    }

    async fn compute_fund(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> Option<FactorRow> {
        let computed = self.fund_performance.compute(code, trade_date, cancel).await;

        let mut row: FundFactorRow = FundFactorRow::empty(code, trade_date);
        row.merge_from(&computed);

        row.short_term_score = self.fund_momentum_scorer.score(&row);
        row.long_term_score = self.fund_alpha_scorer.score(&row);

        Some(FactorRow::Fund(row))
    }
}
