use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use factor_core::coerce::to_float;
use factor_core::{CancelToken, FundFactorComputer, FundFactorRow, Table, TradeDate, UpstreamSubstrate};

use crate::risk::{avg_recovery_days, calmar_ratio, daily_returns, max_drawdown, sharpe_ratio, sortino_ratio, volatility};

const CALL_DEADLINE: Duration = Duration::from_secs(10);
const NAV_HISTORY_DAYS: u32 = 400;
const BENCHMARK_INDEX: &str = "000300.SH";

/// Fund performance/risk/manager factor group (§4.3): windowed returns,
/// volatility, Sharpe/Sortino/Calmar, drawdown recovery, manager tenure and
/// style, and holdings-quality metrics.
pub struct FundPerformanceComputer {
    substrate: Arc<dyn UpstreamSubstrate>,
    provider: String,
}

impl FundPerformanceComputer {
    pub fn new(substrate: Arc<dyn UpstreamSubstrate>, provider: impl Into<String>) -> Self {
        Self { substrate, provider: provider.into() }
    }

    async fn fetch_nav_history(&self, code: &str, trade_date: TradeDate) -> Option<Vec<(TradeDate, f64)>> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        args.insert("limit".to_string(), json!(NAV_HISTORY_DAYS));
        let table = self.substrate.call(&self.provider, "fund_nav_history", args, CALL_DEADLINE).await.ok()?;
        Some(date_value_series(&table, "trade_date", "nav"))
    }

    async fn fetch_index_history(&self, trade_date: TradeDate) -> Option<Vec<(TradeDate, f64)>> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(BENCHMARK_INDEX));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        args.insert("limit".to_string(), json!(NAV_HISTORY_DAYS));
        let table = self.substrate.call(&self.provider, "index_daily_close", args, CALL_DEADLINE).await.ok()?;
        Some(date_value_series(&table, "trade_date", "close"))
    }

    async fn fetch_manager(&self, code: &str) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        self.substrate.call(&self.provider, "fund_manager", args, CALL_DEADLINE).await.ok()
    }

    async fn fetch_holdings(&self, code: &str, trade_date: TradeDate) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        self.substrate.call(&self.provider, "fund_top_holdings", args, CALL_DEADLINE).await.ok()
    }

    async fn fetch_basic(&self, code: &str) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        self.substrate.call(&self.provider, "fund_basic", args, CALL_DEADLINE).await.ok()
    }
}

fn date_value_series(table: &Table, date_col: &str, value_col: &str) -> Vec<(TradeDate, f64)> {
    let (Some(idx_date), Some(idx_value)) = (table.column_index(date_col), table.column_index(value_col)) else {
        return Vec::new();
    };
    let mut series: Vec<(TradeDate, f64)> = table
        .rows
        .iter()
        .filter_map(|row| {
            let date_str = row.get(idx_date).and_then(factor_core::coerce::to_str)?;
            let date = TradeDate::parse_yyyymmdd(&date_str).or_else(|| TradeDate::parse_storage(&date_str))?;
            let value = row.get(idx_value).and_then(to_float)?;
            Some((date, value))
        })
        .collect();
    series.sort_by_key(|(d, _)| *d);
    series
}

/// Percent return from `n` trading sessions ago to the last observation.
fn trailing_return(values: &[f64], n: usize) -> Option<f64> {
    if values.len() <= n {
        return None;
    }
    let start = values[values.len() - 1 - n];
    let end = *values.last()?;
    if start == 0.0 {
        return None;
    }
    Some((end / start - 1.0) * 100.0)
}

fn window_returns(values: &[f64], window: usize) -> Option<&[f64]> {
    if values.len() < window + 1 {
        return None;
    }
    let returns = &values[values.len() - window - 1..];
    Some(returns)
}

/// Manager tenure in fractional years from the manager's start date.
fn manager_tenure_years(table: &Table, trade_date: TradeDate) -> Option<f64> {
    let idx_start = table.column_index("start_date")?;
    let start_str = table.rows.first()?.get(idx_start).and_then(factor_core::coerce::to_str)?;
    let start = TradeDate::parse_yyyymmdd(&start_str).or_else(|| TradeDate::parse_storage(&start_str))?;
    let days = trade_date.trade_days_since(start);
    Some((days as f64 / 252.0).max(0.0))
}

/// Average fund daily return minus average index daily return, annualised,
/// restricted to days the index itself classifies as bull (`bull == true`) or
/// bear (`bull == false`).
fn conditional_alpha(fund_returns: &[(TradeDate, f64)], index_returns: &[(TradeDate, f64)], bull: bool) -> Option<f64> {
    use std::collections::HashMap;
    let index_map: HashMap<TradeDate, f64> = index_returns.iter().cloned().collect();

    let mut fund_sum = 0.0;
    let mut index_sum = 0.0;
    let mut count = 0usize;

    for (date, fund_ret) in fund_returns {
        let Some(index_ret) = index_map.get(date) else { continue };
        let is_bull = *index_ret > 0.0;
        if is_bull != bull {
            continue;
        }
        fund_sum += fund_ret;
        index_sum += index_ret;
        count += 1;
    }

    if count == 0 {
        return None;
    }
    let avg_fund = fund_sum / count as f64 * 252.0;
    let avg_index = index_sum / count as f64 * 252.0;
    Some(avg_fund - avg_index)
}

/// Stability of style: inverse dispersion of quarterly returns over the
/// trailing year, scaled into [0,100].
fn style_consistency(nav: &[f64]) -> Option<f64> {
    if nav.len() < 253 {
        return None;
    }
    let year = &nav[nav.len() - 253..];
    let quarter_len = year.len() / 4;
    if quarter_len < 2 {
        return None;
    }
    let quarterly_returns: Vec<f64> = (0..4)
        .filter_map(|q| {
            let start = year[q * quarter_len];
            let end = year[((q + 1) * quarter_len).min(year.len()) - 1];
            if start == 0.0 {
                None
            } else {
                Some((end / start - 1.0) * 100.0)
            }
        })
        .collect();
    if quarterly_returns.len() < 4 {
        return None;
    }
    let mean = quarterly_returns.iter().sum::<f64>() / 4.0;
    let variance = quarterly_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 4.0;
    let std_dev = variance.sqrt();
    let denom = mean.abs().max(1.0);
    Some((100.0 - (std_dev / denom) * 50.0).clamp(0.0, 100.0))
}

fn herfindahl_diversification(table: &Table) -> Option<f64> {
    let idx_weight = table.column_index("weight")?;
    let weights: Vec<f64> = table.rows.iter().filter_map(|r| r.get(idx_weight).and_then(to_float)).collect();
    if weights.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let hhi: f64 = weights.iter().map(|w| (w / total).powi(2)).sum();
    Some(((1.0 - hhi) * 100.0).clamp(0.0, 100.0))
}

fn holdings_avg_roe(table: &Table) -> Option<f64> {
    let idx_weight = table.column_index("weight")?;
    let idx_roe = table.column_index("roe")?;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for row in &table.rows {
        let (Some(w), Some(r)) = (row.get(idx_weight).and_then(to_float), row.get(idx_roe).and_then(to_float)) else {
            continue;
        };
        weighted_sum += w * r;
        weight_total += w;
    }
    if weight_total <= 0.0 {
        return None;
    }
    Some(weighted_sum / weight_total)
}

#[async_trait]
impl FundFactorComputer for FundPerformanceComputer {
    async fn compute(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> FundFactorRow {
        let mut row = FundFactorRow::empty(code, trade_date);

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(nav_series) = self.fetch_nav_history(code, trade_date).await {
            let nav_values: Vec<f64> = nav_series.iter().map(|(_, v)| *v).collect();

            row.return_1w = trailing_return(&nav_values, 5);
            row.return_1m = trailing_return(&nav_values, 21);
            row.return_3m = trailing_return(&nav_values, 63);
            row.return_6m = trailing_return(&nav_values, 126);
            row.return_1y = trailing_return(&nav_values, 252);

            if let Some(window) = window_returns(&nav_values, 20) {
                let returns = daily_returns(window);
                row.volatility_20d = volatility(&returns);
                row.sharpe_20d = sharpe_ratio(&returns);
            }
            if let Some(window) = window_returns(&nav_values, 60) {
                let returns = daily_returns(window);
                row.volatility_60d = volatility(&returns);
            }
            if let Some(window) = window_returns(&nav_values, 252) {
                let returns = daily_returns(window);
                row.sharpe_1y = sharpe_ratio(&returns);
                row.sortino_1y = sortino_ratio(&returns);
                row.max_drawdown_1y = max_drawdown(window);
                row.avg_recovery_days = avg_recovery_days(window);
                if let Some(max_dd) = row.max_drawdown_1y {
                    row.calmar_1y = calmar_ratio(&returns, max_dd);
                }
            }

            row.style_consistency = style_consistency(&nav_values);

            if !cancel.is_cancelled() {
                if let Some(index_series) = self.fetch_index_history(trade_date).await {
                    let fund_returns: Vec<(TradeDate, f64)> =
                        nav_series.windows(2).map(|w| (w[1].0, (w[1].1 / w[0].1 - 1.0))).collect();
                    let index_returns: Vec<(TradeDate, f64)> =
                        index_series.windows(2).map(|w| (w[1].0, (w[1].1 / w[0].1 - 1.0))).collect();
                    row.manager_alpha_bull = conditional_alpha(&fund_returns, &index_returns, true);
                    row.manager_alpha_bear = conditional_alpha(&fund_returns, &index_returns, false);
                }
            }
        }

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(table) = self.fetch_manager(code).await {
            row.manager_tenure_years = manager_tenure_years(&table, trade_date);
        }

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(table) = self.fetch_holdings(code, trade_date).await {
            row.holdings_avg_roe = holdings_avg_roe(&table);
            row.diversification = herfindahl_diversification(&table);
        }

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(table) = self.fetch_basic(code).await {
            let idx_size = table.column_index("fund_size");
            let idx_turnover = table.column_index("turnover_rate");
            if let Some(first_row) = table.rows.first() {
                row.fund_size = idx_size.and_then(|i| first_row.get(i)).and_then(to_float);
                row.turnover_rate = idx_turnover.and_then(|i| first_row.get(i)).and_then(to_float);
            }
        }

        row
    }

    fn name(&self) -> &'static str {
        "fund_performance"
    }
}
