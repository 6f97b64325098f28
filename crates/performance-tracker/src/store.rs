use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use factor_core::{CoreError, CoreResult, EvaluationStatus, RecType, Recommendation, TradeDate};

/// §4.8 Performance Tracker: records recommendations at creation time, then
/// runs a daily pass evaluating each at the 7-trade-day and 30-trade-day
/// checkpoints.
pub struct PerformanceTracker {
    pool: SqlitePool,
}

impl PerformanceTracker {
    pub async fn connect(database_url: &str) -> CoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let tracker = Self { pool };
        tracker.migrate().await?;
        Ok(tracker)
    }

    async fn migrate(&self) -> CoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS recommendation_performance (
                code TEXT NOT NULL,
                rec_type TEXT NOT NULL,
                rec_date TEXT NOT NULL,
                evaluation_status TEXT NOT NULL,
                row_json TEXT NOT NULL,
                UNIQUE(code, rec_type, rec_date)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rec_perf_status ON recommendation_performance(evaluation_status)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rec_perf_type_date ON recommendation_performance(rec_type, rec_date)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Written at most once per `(code, rec_type, rec_date)` — a conflicting
    /// insert is silently ignored, since the Recommendation Engine owns this
    /// field set and never revises a past recommendation.
    pub async fn record(&self, rec: &Recommendation) -> CoreResult<()> {
        let json = serde_json::to_string(rec).map_err(|e| CoreError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO recommendation_performance (code, rec_type, rec_date, evaluation_status, row_json)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(code, rec_type, rec_date) DO NOTHING",
        )
        .bind(&rec.code)
        .bind(rec.rec_type.as_str())
        .bind(rec.rec_date.to_storage())
        .bind(status_str(rec.evaluation_status))
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, code: &str, rec_type: RecType, rec_date: TradeDate) -> CoreResult<Option<Recommendation>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT row_json FROM recommendation_performance WHERE code = ? AND rec_type = ? AND rec_date = ?",
        )
        .bind(code)
        .bind(rec_type.as_str())
        .bind(rec_date.to_storage())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        row.map(|(json,)| decode(&json)).transpose()
    }

    async fn update(&self, rec: &Recommendation) -> CoreResult<()> {
        let json = serde_json::to_string(rec).map_err(|e| CoreError::Internal(e.to_string()))?;
        sqlx::query(
            "UPDATE recommendation_performance SET evaluation_status = ?, row_json = ?
             WHERE code = ? AND rec_type = ? AND rec_date = ?",
        )
        .bind(status_str(rec.evaluation_status))
        .bind(&json)
        .bind(&rec.code)
        .bind(rec.rec_type.as_str())
        .bind(rec.rec_date.to_storage())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn pending_with_status(&self, status: EvaluationStatus) -> CoreResult<Vec<Recommendation>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT row_json FROM recommendation_performance WHERE evaluation_status = ?")
            .bind(status_str(status))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        rows.iter().map(|(json,)| decode(json)).collect()
    }

    /// Runs the daily evaluation pass (§4.8): every `pending` record whose
    /// rec_date is at least 7 trade-days before `as_of` gets its 7d
    /// checkpoint; every `evaluated_7d` record at least 30 trade-days out
    /// gets its 30d checkpoint and becomes terminal. Re-running with the
    /// same `as_of` is a no-op for records already past a given checkpoint.
    pub async fn evaluate_pending(
        &self,
        substrate: &dyn factor_core::UpstreamSubstrate,
        provider: &str,
        as_of: TradeDate,
    ) -> CoreResult<()> {
        for mut rec in self.pending_with_status(EvaluationStatus::Pending).await? {
            if as_of.trade_days_since(rec.rec_date) < 7 {
                continue;
            }
            let checkpoint = rec.rec_date.plus_trade_days(7);
            let Some(price_7d) = crate::price::fetch_close(substrate, provider, rec.rec_type.kind(), &rec.code, checkpoint).await else {
                continue;
            };
            let return_7d = (price_7d / rec.rec_price - 1.0) * 100.0;
            rec.price_7d = Some(price_7d);
            rec.return_7d = Some(return_7d);
            rec.hit_target = Some(return_7d >= rec.target_return_pct);
            rec.hit_stop = Some(return_7d <= rec.stop_loss_pct);
            rec.evaluation_status = EvaluationStatus::Evaluated7d;
            rec.updated_at = chrono::Utc::now();
            self.update(&rec).await?;
        }

        for mut rec in self.pending_with_status(EvaluationStatus::Evaluated7d).await? {
            if as_of.trade_days_since(rec.rec_date) < 30 {
                continue;
            }
            let checkpoint = rec.rec_date.plus_trade_days(30);
            let Some(price_30d) = crate::price::fetch_close(substrate, provider, rec.rec_type.kind(), &rec.code, checkpoint).await else {
                continue;
            };
            let return_30d = (price_30d / rec.rec_price - 1.0) * 100.0;
            rec.price_30d = Some(price_30d);
            rec.return_30d = Some(return_30d);
            rec.final_return = Some(return_30d);
            rec.hit_target = Some(rec.hit_target == Some(true) || return_30d >= rec.target_return_pct);
            rec.hit_stop = Some(rec.hit_stop == Some(true) || return_30d <= rec.stop_loss_pct);
            rec.evaluation_status = EvaluationStatus::Evaluated30d;
            rec.updated_at = chrono::Utc::now();
            self.update(&rec).await?;
        }

        Ok(())
    }

    /// Aggregates closed outcomes for `rec_type`, optionally restricted to
    /// `[start, end]` on `rec_date`.
    pub async fn stats(&self, rec_type: RecType, start: Option<TradeDate>, end: Option<TradeDate>) -> CoreResult<crate::stats::Aggregation> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT row_json FROM recommendation_performance WHERE rec_type = ?")
            .bind(rec_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let records: CoreResult<Vec<Recommendation>> = rows.iter().map(|(json,)| decode(json)).collect();
        let records = records?
            .into_iter()
            .filter(|r| start.map(|s| r.rec_date >= s).unwrap_or(true))
            .filter(|r| end.map(|e| r.rec_date <= e).unwrap_or(true))
            .collect::<Vec<_>>();

        Ok(crate::stats::aggregate(&records))
    }
}

fn status_str(status: EvaluationStatus) -> &'static str {
    match status {
        EvaluationStatus::Pending => "pending",
        EvaluationStatus::Evaluated7d => "evaluated_7d",
        EvaluationStatus::Evaluated30d => "evaluated_30d",
        EvaluationStatus::Closed => "closed",
    }
}

fn decode(json: &str) -> CoreResult<Recommendation> {
    serde_json::from_str(json).map_err(|e| CoreError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use factor_core::{CallArgs, ProviderStats, Table, UpstreamResult};
    use std::time::Duration;

    struct FixedPriceSubstrate {
        price: f64,
    }

    #[async_trait]
    impl factor_core::UpstreamSubstrate for FixedPriceSubstrate {
        async fn call(&self, _provider: &str, _endpoint: &str, _args: CallArgs, _deadline: Duration) -> UpstreamResult<Table> {
            Ok(Table {
                columns: vec!["close".to_string(), "nav".to_string()],
                rows: vec![vec![factor_core::Cell::Float(self.price), factor_core::Cell::Float(self.price)]],
            })
        }

        async fn stats(&self, _provider: &str) -> Option<ProviderStats> {
            None
        }
    }

    async fn memory_tracker() -> PerformanceTracker {
        PerformanceTracker::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn record_then_get_round_trips() {
        let tracker = memory_tracker().await;
        let rec_date = TradeDate::parse_storage("2026-01-05").unwrap();
        let rec = Recommendation::new("600519.SH", RecType::LongStock, rec_date, 100.0, 80.0);
        tracker.record(&rec).await.unwrap();

        let fetched = tracker.get("600519.SH", RecType::LongStock, rec_date).await.unwrap().unwrap();
        assert_eq!(fetched.rec_price, 100.0);
        assert_eq!(fetched.evaluation_status, EvaluationStatus::Pending);
    }

    #[tokio::test]
    async fn record_is_write_once() {
        let tracker = memory_tracker().await;
        let rec_date = TradeDate::parse_storage("2026-01-05").unwrap();
        let first = Recommendation::new("600519.SH", RecType::LongStock, rec_date, 100.0, 80.0);
        let mut second = Recommendation::new("600519.SH", RecType::LongStock, rec_date, 999.0, 10.0);
        second.evaluation_status = EvaluationStatus::Evaluated30d;

        tracker.record(&first).await.unwrap();
        tracker.record(&second).await.unwrap();

        let fetched = tracker.get("600519.SH", RecType::LongStock, rec_date).await.unwrap().unwrap();
        assert_eq!(fetched.rec_price, 100.0);
    }

    #[tokio::test]
    async fn evaluate_pending_promotes_to_30d_and_sets_final_return() {
        let tracker = memory_tracker().await;
        let rec_date = TradeDate::parse_storage("2026-01-05").unwrap();
        let rec = Recommendation::new("600519.SH", RecType::LongStock, rec_date, 100.0, 80.0);
        tracker.record(&rec).await.unwrap();

        let substrate = FixedPriceSubstrate { price: 112.0 };
        let as_of_7d = rec_date.plus_trade_days(7);
        tracker.evaluate_pending(&substrate, "tushare", as_of_7d).await.unwrap();

        let after_7d = tracker.get("600519.SH", RecType::LongStock, rec_date).await.unwrap().unwrap();
        assert_eq!(after_7d.evaluation_status, EvaluationStatus::Evaluated7d);
        assert!(after_7d.hit_target == Some(true));

        let as_of_30d = rec_date.plus_trade_days(30);
        tracker.evaluate_pending(&substrate, "tushare", as_of_30d).await.unwrap();

        let after_30d = tracker.get("600519.SH", RecType::LongStock, rec_date).await.unwrap().unwrap();
        assert_eq!(after_30d.evaluation_status, EvaluationStatus::Evaluated30d);
        assert_eq!(after_30d.final_return, Some(12.0));
    }

    #[tokio::test]
    async fn stats_only_includes_closed_records() {
        let tracker = memory_tracker().await;
        let rec_date = TradeDate::parse_storage("2026-01-05").unwrap();
        let rec = Recommendation::new("600519.SH", RecType::LongStock, rec_date, 100.0, 80.0);
        tracker.record(&rec).await.unwrap();

        let agg = tracker.stats(RecType::LongStock, None, None).await.unwrap();
        assert_eq!(agg.count, 0);
    }
}
