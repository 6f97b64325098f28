use std::sync::Arc;

use dashmap::DashMap;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use factor_core::{CoreError, CoreResult, FundFactorRow, InstrumentKind, StockFactorRow, TradeDate};

use crate::cache::CacheEntry;
use crate::FactorRow;

const CACHE_TTL_SECS: i64 = 300;
const VALID_SCORE_FIELDS: [&str; 2] = ["short_term_score", "long_term_score"];

type CacheKey = (InstrumentKind, String, TradeDate);

/// §4.2 Factor Store: durable dated FactorRow snapshots fronted by an
/// in-process TTL cache. `put_factor` is the sole writer; everything else
/// reads.
pub struct FactorStore {
    pool: SqlitePool,
    cache: Arc<DashMap<CacheKey, CacheEntry>>,
}

impl FactorStore {
    pub async fn connect(database_url: &str) -> CoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let store = Self { pool, cache: Arc::new(DashMap::new()) };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> CoreResult<()> {
        for table in ["stock_factors_daily", "fund_factors_daily"] {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    code TEXT NOT NULL,
                    trade_date TEXT NOT NULL,
                    short_term_score REAL,
                    long_term_score REAL,
                    row_json TEXT NOT NULL,
                    computed_at TEXT NOT NULL,
                    UNIQUE(code, trade_date)
                )"
            );
            sqlx::query(&ddl).execute(&self.pool).await.map_err(|e| CoreError::Internal(e.to_string()))?;

            for (suffix, column) in [("short", "short_term_score"), ("long", "long_term_score")] {
                let idx = format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{suffix} ON {table}(trade_date, {column} DESC)"
                );
                sqlx::query(&idx).execute(&self.pool).await.map_err(|e| CoreError::Internal(e.to_string()))?;
            }
            let idx_code = format!("CREATE INDEX IF NOT EXISTS idx_{table}_code ON {table}(code)");
            sqlx::query(&idx_code).execute(&self.pool).await.map_err(|e| CoreError::Internal(e.to_string()))?;
        }
        Ok(())
    }

    fn table_for(kind: InstrumentKind) -> &'static str {
        match kind {
            InstrumentKind::Stock => "stock_factors_daily",
            InstrumentKind::Fund => "fund_factors_daily",
        }
    }

    fn cache_key(row: &FactorRow) -> CacheKey {
        (row.kind(), row.code().to_string(), row.trade_date())
    }

    /// Idempotent upsert keyed by `(kind, code, trade_date)`. Last writer wins.
    pub async fn put_factor(&self, row: FactorRow) -> CoreResult<()> {
        let table = Self::table_for(row.kind());
        let (code, trade_date, short, long, json, computed_at) = match &row {
            FactorRow::Stock(r) => (
                r.code.clone(),
                r.trade_date.to_storage(),
                r.short_term_score,
                r.long_term_score,
                serde_json::to_string(r).map_err(|e| CoreError::Internal(e.to_string()))?,
                r.computed_at.to_rfc3339(),
            ),
            FactorRow::Fund(r) => (
                r.code.clone(),
                r.trade_date.to_storage(),
                r.short_term_score,
                r.long_term_score,
                serde_json::to_string(r).map_err(|e| CoreError::Internal(e.to_string()))?,
                r.computed_at.to_rfc3339(),
            ),
        };

        let sql = format!(
            "INSERT INTO {table} (code, trade_date, short_term_score, long_term_score, row_json, computed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(code, trade_date) DO UPDATE SET
                short_term_score = excluded.short_term_score,
                long_term_score = excluded.long_term_score,
                row_json = excluded.row_json,
                computed_at = excluded.computed_at"
        );
        sqlx::query(&sql)
            .bind(&code)
            .bind(&trade_date)
            .bind(short)
            .bind(long)
            .bind(&json)
            .bind(&computed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        self.cache.insert(Self::cache_key(&row), CacheEntry::new(row, CACHE_TTL_SECS));
        Ok(())
    }

    /// Cache-through read of one row.
    pub async fn get_factor(&self, kind: InstrumentKind, code: &str, trade_date: TradeDate) -> CoreResult<Option<FactorRow>> {
        let key: CacheKey = (kind, code.to_string(), trade_date);
        if let Some(entry) = self.cache.get(&key) {
            if !entry.is_expired() {
                return Ok(Some(entry.row.clone()));
            }
        }
        self.cache.remove(&key);

        let table = Self::table_for(kind);
        let sql = format!("SELECT row_json FROM {table} WHERE code = ? AND trade_date = ?");
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(code)
            .bind(trade_date.to_storage())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let Some((json,)) = row else { return Ok(None) };
        let factor_row = decode_row(kind, &json)?;
        self.cache.insert(key, CacheEntry::new(factor_row.clone(), CACHE_TTL_SECS));
        Ok(Some(factor_row))
    }

    /// Rows ordered by `score_field` descending (tie-break `code` ascending),
    /// restricted to `score_field >= min_score`. Reads only; never computes.
    pub async fn top_n(
        &self,
        kind: InstrumentKind,
        trade_date: TradeDate,
        score_field: &str,
        min_score: f64,
        n: usize,
    ) -> CoreResult<Vec<FactorRow>> {
        if !VALID_SCORE_FIELDS.contains(&score_field) {
            return Err(CoreError::InvalidArgument(format!("unknown score field '{score_field}'")));
        }

        let table = Self::table_for(kind);
        let sql = format!(
            "SELECT row_json FROM {table}
             WHERE trade_date = ? AND {score_field} >= ?
             ORDER BY {score_field} DESC, code ASC
             LIMIT ?"
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(trade_date.to_storage())
            .bind(min_score)
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        rows.iter().map(|(json,)| decode_row(kind, json)).collect()
    }

    /// Invalidates the cache for `(kind, trade_date)`; used by the Daily
    /// Computer so the next query picks up freshly written rows.
    pub fn clear_for_date(&self, kind: InstrumentKind, trade_date: TradeDate) {
        self.cache.retain(|key, _| !(key.0 == kind && key.2 == trade_date));
    }

    /// Deletes FactorRows older than the retention horizon, keeping the most
    /// recent `keep_dates` distinct trade-dates per kind.
    pub async fn prune(&self, keep_dates: i64) -> CoreResult<()> {
        for kind in [InstrumentKind::Stock, InstrumentKind::Fund] {
            let table = Self::table_for(kind);
            let sql = format!("SELECT DISTINCT trade_date FROM {table} ORDER BY trade_date DESC LIMIT ?");
            let dates: Vec<(String,)> = sqlx::query_as(&sql)
                .bind(keep_dates)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))?;

            let Some((cutoff,)) = dates.last() else { continue };
            let delete_sql = format!("DELETE FROM {table} WHERE trade_date < ?");
            sqlx::query(&delete_sql).bind(cutoff).execute(&self.pool).await.map_err(|e| CoreError::Internal(e.to_string()))?;
        }
        Ok(())
    }
}

fn decode_row(kind: InstrumentKind, json: &str) -> CoreResult<FactorRow> {
    match kind {
        InstrumentKind::Stock => {
            let row: StockFactorRow = serde_json::from_str(json).map_err(|e| CoreError::Internal(e.to_string()))?;
            Ok(FactorRow::Stock(row))
        }
        InstrumentKind::Fund => {
            let row: FundFactorRow = serde_json::from_str(json).map_err(|e| CoreError::Internal(e.to_string()))?;
            Ok(FactorRow::Fund(row))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> FactorStore {
        FactorStore::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_stock_row(code: &str, trade_date: TradeDate, long_score: f64) -> FactorRow {
        let mut row = StockFactorRow::empty(code, trade_date);
        row.long_term_score = Some(long_score);
        FactorRow::Stock(row)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = memory_store().await;
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        store.put_factor(sample_stock_row("600519", trade_date, 82.0)).await.unwrap();

        let fetched = store.get_factor(InstrumentKind::Stock, "600519", trade_date).await.unwrap().unwrap();
        assert_eq!(fetched.score("long_term_score"), Some(82.0));
    }

    #[tokio::test]
    async fn top_n_orders_by_score_then_code() {
        let store = memory_store().await;
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        store.put_factor(sample_stock_row("600519", trade_date, 75.0)).await.unwrap();
        store.put_factor(sample_stock_row("000001", trade_date, 80.0)).await.unwrap();
        store.put_factor(sample_stock_row("000002", trade_date, 40.0)).await.unwrap();

        let top = store.top_n(InstrumentKind::Stock, trade_date, "long_term_score", 60.0, 5).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].code(), "000001");
        assert_eq!(top[1].code(), "600519");
    }

    #[tokio::test]
    async fn rejects_unknown_score_field() {
        let store = memory_store().await;
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let result = store.top_n(InstrumentKind::Stock, trade_date, "bogus_field", 0.0, 5).await;
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn put_is_idempotent_last_writer_wins() {
        let store = memory_store().await;
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        store.put_factor(sample_stock_row("600519", trade_date, 50.0)).await.unwrap();
        store.put_factor(sample_stock_row("600519", trade_date, 90.0)).await.unwrap();

        let fetched = store.get_factor(InstrumentKind::Stock, "600519", trade_date).await.unwrap().unwrap();
        assert_eq!(fetched.score("long_term_score"), Some(90.0));
    }
}
