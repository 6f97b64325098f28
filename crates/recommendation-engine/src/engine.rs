use std::sync::Arc;

use factor_core::{
    ConfidenceBucket, CoreResult, InstrumentKind, RecType, Recommendation, Scorer, StockFactorRow, TradeDate, UpstreamSubstrate,
};
use factor_store::{FactorRow, FactorStore};
use performance_tracker::PerformanceTracker;
use strategy_scorers::{FundAlphaScorer, FundMomentumScorer, LongTermStockScorer, ShortTermStockScorer};

use crate::explain::{self, ExplanationClient};
use crate::metadata::fetch_stock_metadata;
use crate::prefs::UserPrefs;

const QUALITY_GATE_MIN_ROE: f64 = 10.0;
const QUALITY_GATE_MIN_OCF: f64 = 0.5;
const QUALITY_GATE_MAX_DEBT: f64 = 80.0;
const TRACKED_RECORD_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Short,
    Long,
}

fn rec_type(strategy: Strategy, kind: InstrumentKind) -> RecType {
    match (strategy, kind) {
        (Strategy::Short, InstrumentKind::Stock) => RecType::ShortStock,
        (Strategy::Long, InstrumentKind::Stock) => RecType::LongStock,
        (Strategy::Short, InstrumentKind::Fund) => RecType::ShortFund,
        (Strategy::Long, InstrumentKind::Fund) => RecType::LongFund,
    }
}

#[derive(Debug, Clone)]
pub struct RecommendationResult {
    pub code: String,
    pub score: f64,
    pub confidence: ConfidenceBucket,
    pub key_factors: Vec<String>,
    /// `Some(bool)` only for the long-stock strategy, where §4.6 defines an
    /// explicit quality gate distinct from the scorer's own soft cap.
    pub passes_quality_gate: Option<bool>,
    pub explanation: String,
}

/// §4.6 Recommendation Engine + §4.7 Explanation Annotator: reads the
/// already-computed Factor Store, never triggers on-demand computation.
pub struct RecommendationEngine {
    store: Arc<FactorStore>,
    tracker: Arc<PerformanceTracker>,
    substrate: Arc<dyn UpstreamSubstrate>,
    provider: String,
    explainer: Option<Arc<dyn ExplanationClient>>,

    short_stock_scorer: ShortTermStockScorer,
    long_stock_scorer: LongTermStockScorer,
    fund_momentum_scorer: FundMomentumScorer,
    fund_alpha_scorer: FundAlphaScorer,
}

impl RecommendationEngine {
    pub fn new(
        store: Arc<FactorStore>,
        tracker: Arc<PerformanceTracker>,
        substrate: Arc<dyn UpstreamSubstrate>,
        provider: impl Into<String>,
        explainer: Option<Arc<dyn ExplanationClient>>,
    ) -> Self {
        Self {
            store,
            tracker,
            substrate,
            provider: provider.into(),
            explainer,
            short_stock_scorer: ShortTermStockScorer::new(),
            long_stock_scorer: LongTermStockScorer::new(),
            fund_momentum_scorer: FundMomentumScorer::new(),
            fund_alpha_scorer: FundAlphaScorer::new(),
        }
    }

    pub async fn get_factor_snapshot(&self, kind: InstrumentKind, code: &str, trade_date: TradeDate) -> CoreResult<Option<FactorRow>> {
        self.store.get_factor(kind, code, trade_date).await
    }

    /// Re-scores a single instrument from its stored FactorRow, through the
    /// same scorer code path the Daily Computer uses, so the result agrees
    /// byte-for-byte with the batch-computed score (§4.4, §4.6).
    pub async fn analyze(&self, kind: InstrumentKind, code: &str, trade_date: TradeDate) -> CoreResult<Option<(Option<f64>, Option<f64>)>> {
        let Some(row) = self.store.get_factor(kind, code, trade_date).await? else { return Ok(None) };
        let scores = match &row {
            FactorRow::Stock(r) => (self.short_stock_scorer.score(r), self.long_stock_scorer.score(r)),
            FactorRow::Fund(r) => (self.fund_momentum_scorer.score(r), self.fund_alpha_scorer.score(r)),
        };
        Ok(Some(scores))
    }

    pub async fn recommend(
        &self,
        strategy: Strategy,
        kind: InstrumentKind,
        top_n: usize,
        min_score: f64,
        trade_date: TradeDate,
        user_prefs: Option<&UserPrefs>,
    ) -> CoreResult<Vec<RecommendationResult>> {
        let rec_type = rec_type(strategy, kind);
        let score_field = rec_type.score_field();

        // Over-fetch so post-filtering (quality gate, user preferences)
        // still leaves room to fill `top_n` (§4.6 step 1).
        let rows = match self.store.top_n(kind, trade_date, score_field, min_score, top_n * 2).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "factor store query failed, returning empty recommendation list");
                return Ok(Vec::new());
            }
        };

        // Property: an empty Factor Store yields an empty result with zero
        // further upstream calls — never fall back to on-demand computation.
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(FactorRow, f64)> = rows
            .into_iter()
            .filter_map(|row| {
                let score = row.score(score_field)?;
                Some((row, score))
            })
            .collect();

        let long_stock = strategy == Strategy::Long && kind == InstrumentKind::Stock;

        if long_stock {
            candidates.retain(|(row, _)| row.as_stock().map(passes_quality_gate).unwrap_or(false));
        }

        let prefs = user_prefs.cloned().unwrap_or_default();
        let metadata = if kind == InstrumentKind::Stock && !prefs.is_default() {
            let codes: Vec<String> = candidates.iter().map(|(row, _)| row.code().to_string()).collect();
            fetch_stock_metadata(self.substrate.as_ref(), &self.provider, &codes).await
        } else {
            std::collections::HashMap::new()
        };

        let mut scored: Vec<(FactorRow, f64)> = candidates
            .into_iter()
            .filter(|(row, _)| row.as_stock().map(|stock| prefs.passes(stock, metadata.get(row.code()))).unwrap_or(true))
            .map(|(row, score)| {
                let adjusted = prefs.boosted_score(score, metadata.get(row.code()));
                (row, adjusted)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.code().cmp(b.0.code())));
        scored.truncate(top_n);

        let key_factors: Vec<Vec<String>> = scored
            .iter()
            .map(|(row, _)| match row {
                FactorRow::Stock(r) if long_stock => self.long_stock_scorer.key_factors(r),
                FactorRow::Stock(r) => self.short_stock_scorer.key_factors(r),
                FactorRow::Fund(r) if strategy == Strategy::Long => self.fund_alpha_scorer.key_factors(r),
                FactorRow::Fund(r) => self.fund_momentum_scorer.key_factors(r),
            })
            .collect();

        let explanations = explain::annotate(self.explainer.as_deref(), &key_factors).await;

        let mut results = Vec::with_capacity(scored.len());
        for (i, (row, score)) in scored.iter().enumerate() {
            results.push(RecommendationResult {
                code: row.code().to_string(),
                score: *score,
                confidence: ConfidenceBucket::from_score(*score),
                key_factors: key_factors[i].clone(),
                passes_quality_gate: if long_stock { Some(true) } else { None },
                explanation: explanations.get(i).cloned().unwrap_or_default(),
            });
        }

        self.record_tracked(rec_type, trade_date, &results).await;

        Ok(results)
    }

    async fn record_tracked(&self, rec_type: RecType, trade_date: TradeDate, results: &[RecommendationResult]) {
        for result in results.iter().take(TRACKED_RECORD_LIMIT) {
            let Some(price) = performance_tracker::price::fetch_close(self.substrate.as_ref(), &self.provider, rec_type.kind(), &result.code, trade_date).await else {
                tracing::warn!(code = %result.code, "no current price available, skipping performance tracking for this recommendation");
                continue;
            };
            let rec = Recommendation::new(result.code.clone(), rec_type, trade_date, price, result.score);
            if let Err(e) = self.tracker.record(&rec).await {
                tracing::warn!(code = %result.code, error = %e, "failed to record recommendation for performance tracking");
            }
        }
    }
}

fn passes_quality_gate(row: &StockFactorRow) -> bool {
    let roe_ok = row.roe.map(|r| r >= QUALITY_GATE_MIN_ROE).unwrap_or(false);
    let ocf_ok = row.ocf_to_profit.map(|o| o >= QUALITY_GATE_MIN_OCF).unwrap_or(true);
    let debt_ok = row.debt_ratio.map(|d| d <= QUALITY_GATE_MAX_DEBT).unwrap_or(true);
    roe_ok && ocf_ok && debt_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use factor_core::{CallArgs, Cell, ProviderStats, Table, UpstreamResult};
    use std::time::Duration;

    struct NoopSubstrate;

    #[async_trait::async_trait]
    impl UpstreamSubstrate for NoopSubstrate {
        async fn call(&self, _provider: &str, _endpoint: &str, _args: CallArgs, _deadline: Duration) -> UpstreamResult<Table> {
            Ok(Table { columns: vec!["close".to_string()], rows: vec![vec![Cell::Float(10.0)]] })
        }
        async fn stats(&self, _provider: &str) -> Option<ProviderStats> {
            None
        }
    }

    async fn engine() -> RecommendationEngine {
        let store = Arc::new(FactorStore::connect("sqlite::memory:").await.unwrap());
        let tracker = Arc::new(PerformanceTracker::connect("sqlite::memory:").await.unwrap());
        let substrate: Arc<dyn UpstreamSubstrate> = Arc::new(NoopSubstrate);
        RecommendationEngine::new(store, tracker, substrate, "tushare", None)
    }

    #[tokio::test]
    async fn empty_store_yields_empty_recommendations() {
        let engine = engine().await;
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let result = engine.recommend(Strategy::Long, InstrumentKind::Stock, 10, 0.0, trade_date, None).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn quality_gate_excludes_low_roe_long_stock_rows() {
        let engine = engine().await;
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();

        let mut good = StockFactorRow::empty("600519", trade_date);
        good.roe = Some(22.0);
        good.long_term_score = Some(80.0);

        let mut bad = StockFactorRow::empty("000002", trade_date);
        bad.roe = Some(5.0);
        bad.long_term_score = Some(90.0);

        engine.store.put_factor(FactorRow::Stock(good)).await.unwrap();
        engine.store.put_factor(FactorRow::Stock(bad)).await.unwrap();

        let result = engine.recommend(Strategy::Long, InstrumentKind::Stock, 10, 0.0, trade_date, None).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].code, "600519");
        assert_eq!(result[0].passes_quality_gate, Some(true));
    }

    #[tokio::test]
    async fn analyze_reuses_scorer_for_stored_row() {
        let engine = engine().await;
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let mut row = StockFactorRow::empty("600519", trade_date);
        row.roe = Some(22.0);
        row.peg_ratio = Some(0.8);
        engine.store.put_factor(FactorRow::Stock(row.clone())).await.unwrap();

        let (_, long) = engine.analyze(InstrumentKind::Stock, "600519", trade_date).await.unwrap().unwrap();
        assert_eq!(long, LongTermStockScorer::new().score(&row));
    }
}
