use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;

use factor_core::coerce::to_float;
use factor_core::{Table, TradeDate, UpstreamSubstrate};

use crate::etf_linkage::{self, TopHolding};
use crate::quote::RealtimeQuoteFetcher;

const CALL_DEADLINE: Duration = Duration::from_secs(10);
const NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(3600);
const MAX_HOLDINGS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuationMethod {
    VendorPublished,
    EtfLinked,
    HoldingsWeighted,
    NotAvailable,
}

#[derive(Debug, Clone)]
pub struct ValuationEstimate {
    pub code: String,
    pub estimated_value: Option<f64>,
    /// Estimated same-day change, as a percentage (e.g. `2.0` for +2%).
    pub estimated_change_pct: Option<f64>,
    pub method: ValuationMethod,
    /// Set only when `method` is `NotAvailable`: which waterfall step failed
    /// and why (§4.9 step 4).
    pub reason: Option<String>,
    pub as_of: DateTime<Utc>,
}

/// §4.9 Valuation Estimator: a 4-path waterfall from most to least
/// authoritative. Each path only runs if the previous one had nothing to
/// say; `not_available` never masks a path that could still be tried.
pub struct ValuationEstimator {
    substrate: Arc<dyn UpstreamSubstrate>,
    provider: String,
    quotes: RealtimeQuoteFetcher,
    vendor_miss_cache: DashMap<String, Instant>,
}

impl ValuationEstimator {
    pub fn new(substrate: Arc<dyn UpstreamSubstrate>, provider: impl Into<String>, free_quote_provider: impl Into<String>, metered_quote_provider: impl Into<String>) -> Self {
        let provider = provider.into();
        let quotes = RealtimeQuoteFetcher::new(substrate.clone(), free_quote_provider, metered_quote_provider);
        Self { substrate, provider, quotes, vendor_miss_cache: DashMap::new() }
    }

    pub async fn estimate(&self, code: &str, name: &str, trade_date: TradeDate) -> ValuationEstimate {
        if !self.vendor_recently_missed(code) {
            if let Some(value) = self.fetch_vendor_estimate(code).await {
                let change_pct = self.fetch_last_nav(code, trade_date).await.and_then(|prior| change_pct(prior, value));
                return self.result(code, Some(value), change_pct, ValuationMethod::VendorPublished, None);
            }
            self.vendor_miss_cache.insert(code.to_string(), Instant::now());
        }

        let holdings_table = self.fetch_holdings_table(code, trade_date).await;
        let holdings = holdings_table.as_ref().map(|t| parse_holdings(t, MAX_HOLDINGS)).unwrap_or_default();

        let linkage = etf_linkage::detect(code, name, Some(&holdings));
        if let Some(etf_code) = &linkage.etf_code {
            if let Some((value, change_pct)) = self.estimate_via_etf_linkage(code, etf_code, trade_date).await {
                return self.result(code, Some(value), Some(change_pct), ValuationMethod::EtfLinked, None);
            }
        }

        if !holdings.is_empty() {
            if let Some((value, change_pct)) = self.estimate_via_holdings(code, &holdings, trade_date).await {
                return self.result(code, Some(value), Some(change_pct), ValuationMethod::HoldingsWeighted, None);
            }
        }

        let reason = if linkage.etf_code.is_some() {
            "etf linkage detected but its quote or prior close could not be fetched"
        } else if holdings.is_empty() {
            "no vendor estimate, no detected ETF linkage, and no holdings to extrapolate from"
        } else {
            "holdings present but none could be priced intraday"
        };
        self.result(code, None, None, ValuationMethod::NotAvailable, Some(reason.to_string()))
    }

    fn vendor_recently_missed(&self, code: &str) -> bool {
        self.vendor_miss_cache.get(code).map(|at| at.elapsed() < NEGATIVE_CACHE_TTL).unwrap_or(false)
    }

    fn result(
        &self,
        code: &str,
        estimated_value: Option<f64>,
        estimated_change_pct: Option<f64>,
        method: ValuationMethod,
        reason: Option<String>,
    ) -> ValuationEstimate {
        ValuationEstimate { code: code.to_string(), estimated_value, estimated_change_pct, method, reason, as_of: Utc::now() }
    }

    async fn fetch_vendor_estimate(&self, code: &str) -> Option<f64> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        let table = self.substrate.call(&self.provider, "fund_vendor_estimate", args, CALL_DEADLINE).await.ok()?;
        let idx = table.column_index("estimated_nav")?;
        table.rows.first().and_then(|row| row.get(idx)).and_then(to_float)
    }

    async fn fetch_holdings_table(&self, code: &str, trade_date: TradeDate) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        self.substrate.call(&self.provider, "fund_top_holdings", args, CALL_DEADLINE).await.ok()
    }

    async fn fetch_last_nav(&self, code: &str, trade_date: TradeDate) -> Option<f64> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        args.insert("limit".to_string(), json!(1));
        let table = self.substrate.call(&self.provider, "fund_nav_history", args, CALL_DEADLINE).await.ok()?;
        let idx = table.column_index("nav")?;
        table.rows.first().and_then(|row| row.get(idx)).and_then(to_float)
    }

    async fn fetch_prior_close(&self, stock_code: &str, trade_date: TradeDate) -> Option<f64> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(stock_code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        args.insert("limit".to_string(), json!(1));
        let table = self.substrate.call(&self.provider, "stock_daily_ohlcv", args, CALL_DEADLINE).await.ok()?;
        let idx = table.column_index("close")?;
        table.rows.first().and_then(|row| row.get(idx)).and_then(to_float)
    }

    /// `nav_estimate = last_known_nav * (etf_price_now / etf_prior_close)`;
    /// the change % is the ETF's own intraday return, since it's the same
    /// ratio applied to the fund's last NAV.
    async fn estimate_via_etf_linkage(&self, fund_code: &str, etf_code: &str, trade_date: TradeDate) -> Option<(f64, f64)> {
        let (last_nav, prior_close, current_price) = tokio::join!(
            self.fetch_last_nav(fund_code, trade_date),
            self.fetch_prior_close(etf_code, trade_date),
            self.quotes.fetch(etf_code),
        );
        let (last_nav, prior_close, current_price) = (last_nav?, prior_close?, current_price?);
        if prior_close == 0.0 {
            return None;
        }
        let ratio = current_price / prior_close;
        Some((last_nav * ratio, (ratio - 1.0) * 100.0))
    }

    /// Weighted extrapolation over up to `MAX_HOLDINGS` positions: each
    /// holding contributes its intraday return, weighted by portfolio
    /// share. Missing per-holding quotes are excluded and weights
    /// re-normalized over whatever priced — never treated as a 0% return.
    async fn estimate_via_holdings(&self, fund_code: &str, holdings: &[TopHolding], trade_date: TradeDate) -> Option<(f64, f64)> {
        let last_nav = self.fetch_last_nav(fund_code, trade_date).await?;

        let mut weighted_return = 0.0;
        let mut weight_total = 0.0;
        for holding in holdings {
            let (Some(prior), Some(now)) = (self.fetch_prior_close(&holding.code, trade_date).await, self.quotes.fetch(&holding.code).await) else {
                continue;
            };
            if prior == 0.0 {
                continue;
            }
            let holding_return_pct = (now / prior - 1.0) * 100.0;
            weighted_return += holding.weight_pct * holding_return_pct;
            weight_total += holding.weight_pct;
        }

        if weight_total <= 0.0 {
            return None;
        }
        let portfolio_return_pct = weighted_return / weight_total;
        Some((last_nav * (1.0 + portfolio_return_pct / 100.0), portfolio_return_pct))
    }
}

/// `(estimate / prior - 1) * 100`, guarding against a zero prior NAV.
fn change_pct(prior: f64, estimate: f64) -> Option<f64> {
    if prior == 0.0 {
        return None;
    }
    Some((estimate / prior - 1.0) * 100.0)
}

fn parse_holdings(table: &Table, limit: usize) -> Vec<TopHolding> {
    let Some(idx_code) = table.column_index("code") else { return Vec::new() };
    let Some(idx_weight) = table.column_index("weight") else { return Vec::new() };

    table
        .rows
        .iter()
        .filter_map(|row| {
            let code = row.get(idx_code).and_then(factor_core::coerce::to_str)?;
            let weight_pct = row.get(idx_weight).and_then(to_float)?;
            Some(TopHolding { code, weight_pct })
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use factor_core::{CallArgs, Cell, ProviderStats, UpstreamResult};

    struct ScriptedSubstrate {
        vendor_available: bool,
        has_holdings: bool,
    }

    #[async_trait]
    impl UpstreamSubstrate for ScriptedSubstrate {
        async fn call(&self, _provider: &str, endpoint: &str, _args: CallArgs, _deadline: Duration) -> UpstreamResult<Table> {
            match endpoint {
                "fund_vendor_estimate" if self.vendor_available => {
                    Ok(Table { columns: vec!["estimated_nav".to_string()], rows: vec![vec![Cell::Float(1.234)]] })
                }
                "fund_vendor_estimate" => Err(factor_core::UpstreamError::NotFound),
                "fund_top_holdings" if self.has_holdings => Ok(Table {
                    columns: vec!["code".to_string(), "weight".to_string()],
                    rows: vec![vec![Cell::Text("510300".to_string()), Cell::Float(92.0)]],
                }),
                "fund_top_holdings" => Ok(Table { columns: vec!["code".to_string(), "weight".to_string()], rows: vec![] }),
                "fund_nav_history" => Ok(Table { columns: vec!["nav".to_string()], rows: vec![vec![Cell::Float(1.0)]] }),
                "stock_daily_ohlcv" => Ok(Table { columns: vec!["close".to_string()], rows: vec![vec![Cell::Float(4.0)]] }),
                "realtime_quote" => Ok(Table { columns: vec!["price".to_string()], rows: vec![vec![Cell::Float(4.4)]] }),
                _ => Err(factor_core::UpstreamError::NotFound),
            }
        }

        async fn stats(&self, _provider: &str) -> Option<ProviderStats> {
            None
        }
    }

    fn estimator(vendor_available: bool, has_holdings: bool) -> ValuationEstimator {
        let substrate: Arc<dyn UpstreamSubstrate> = Arc::new(ScriptedSubstrate { vendor_available, has_holdings });
        ValuationEstimator::new(substrate, "tushare", "free_quotes", "metered_quotes")
    }

    #[tokio::test]
    async fn vendor_path_wins_when_available() {
        let est = estimator(true, true);
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let result = est.estimate("110026", "易方达创业板ETF联接A", trade_date).await;
        assert_eq!(result.method, ValuationMethod::VendorPublished);
        assert_eq!(result.estimated_value, Some(1.234));
    }

    #[tokio::test]
    async fn falls_through_to_etf_linkage_when_vendor_unavailable() {
        let est = estimator(false, true);
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let result = est.estimate("999999", "某某ETF联接基金", trade_date).await;
        assert_eq!(result.method, ValuationMethod::EtfLinked);
        // nav(1.0) * (4.4/4.0) = 1.1
        assert!((result.estimated_value.unwrap() - 1.1).abs() < 1e-9);
        // (4.4/4.0 - 1) * 100 = 10.0%
        assert!((result.estimated_change_pct.unwrap() - 10.0).abs() < 1e-9);
    }

    struct FixedNavEtfSubstrate;

    #[async_trait]
    impl UpstreamSubstrate for FixedNavEtfSubstrate {
        async fn call(&self, _provider: &str, endpoint: &str, _args: CallArgs, _deadline: Duration) -> UpstreamResult<Table> {
            match endpoint {
                "fund_vendor_estimate" => Err(factor_core::UpstreamError::NotFound),
                "fund_top_holdings" => Ok(Table { columns: vec!["code".to_string(), "weight".to_string()], rows: vec![] }),
                "fund_nav_history" => Ok(Table { columns: vec!["nav".to_string()], rows: vec![vec![Cell::Float(1.5)]] }),
                "stock_daily_ohlcv" => Ok(Table { columns: vec!["close".to_string()], rows: vec![vec![Cell::Float(4.0)]] }),
                "realtime_quote" => Ok(Table { columns: vec!["price".to_string()], rows: vec![vec![Cell::Float(4.08)]] }),
                _ => Err(factor_core::UpstreamError::NotFound),
            }
        }

        async fn stats(&self, _provider: &str) -> Option<ProviderStats> {
            None
        }
    }

    #[tokio::test]
    async fn etf_linkage_reports_literal_nav_and_change_pct() {
        let substrate: Arc<dyn UpstreamSubstrate> = Arc::new(FixedNavEtfSubstrate);
        let est = ValuationEstimator::new(substrate, "tushare", "free_quotes", "metered_quotes");
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let result = est.estimate("007339", "某某ETF联接基金", trade_date).await;
        assert_eq!(result.method, ValuationMethod::EtfLinked);
        assert!((result.estimated_value.unwrap() - 1.530).abs() < 1e-9);
        assert!((result.estimated_change_pct.unwrap() - 2.00).abs() < 1e-9);
    }

    #[tokio::test]
    async fn holdings_weighted_path_used_for_non_linkage_funds() {
        let est = estimator(false, true);
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let result = est.estimate("000001", "普通股票型基金", trade_date).await;
        assert_eq!(result.method, ValuationMethod::HoldingsWeighted);
        assert!((result.estimated_value.unwrap() - 1.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn not_available_when_no_path_resolves() {
        let est = estimator(false, false);
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let result = est.estimate("000001", "普通股票型基金", trade_date).await;
        assert_eq!(result.method, ValuationMethod::NotAvailable);
        assert_eq!(result.estimated_value, None);
    }
}
