use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use factor_core::coerce::to_float;
use factor_core::{CancelToken, StockFactorComputer, StockFactorRow, Table, TradeDate, UpstreamSubstrate};

use crate::ratios::{cagr, inverse_coefficient_of_variation, percentile_rank, yoy_growth};

const CALL_DEADLINE: Duration = Duration::from_secs(10);
const FINANCIAL_PERIODS: u32 = 4;
const VALUATION_HISTORY_DAYS: u32 = 250;

/// Stock fundamental factor group (§4.3): ROE/margin/cash-flow/leverage,
/// growth and CAGR, and own-history PE/PB percentiles.
pub struct FundamentalFactorComputer {
    substrate: Arc<dyn UpstreamSubstrate>,
    provider: String,
}

impl FundamentalFactorComputer {
    pub fn new(substrate: Arc<dyn UpstreamSubstrate>, provider: impl Into<String>) -> Self {
        Self { substrate, provider: provider.into() }
    }

    async fn fetch_financials(&self, code: &str, trade_date: TradeDate) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        args.insert("periods".to_string(), json!(FINANCIAL_PERIODS));
        self.substrate
            .call(&self.provider, "stock_financial_indicators", args, CALL_DEADLINE)
            .await
            .ok()
    }

    async fn fetch_valuation_history(&self, code: &str, trade_date: TradeDate) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        args.insert("limit".to_string(), json!(VALUATION_HISTORY_DAYS));
        self.substrate
            .call(&self.provider, "stock_valuation_history", args, CALL_DEADLINE)
            .await
            .ok()
    }
}

struct AnnualReport {
    roe: Option<f64>,
    gross_margin: Option<f64>,
    ocf_to_profit: Option<f64>,
    debt_ratio: Option<f64>,
    revenue: Option<f64>,
    net_profit: Option<f64>,
}

fn financial_reports(table: &Table) -> Vec<AnnualReport> {
    let idx_roe = table.column_index("roe");
    let idx_gm = table.column_index("gross_margin");
    let idx_ocf = table.column_index("ocf_to_profit");
    let idx_debt = table.column_index("debt_ratio");
    let idx_rev = table.column_index("revenue");
    let idx_profit = table.column_index("net_profit");

    table
        .rows
        .iter()
        .map(|row| AnnualReport {
            roe: idx_roe.and_then(|i| row.get(i)).and_then(to_float),
            gross_margin: idx_gm.and_then(|i| row.get(i)).and_then(to_float),
            ocf_to_profit: idx_ocf.and_then(|i| row.get(i)).and_then(to_float),
            debt_ratio: idx_debt.and_then(|i| row.get(i)).and_then(to_float),
            revenue: idx_rev.and_then(|i| row.get(i)).and_then(to_float),
            net_profit: idx_profit.and_then(|i| row.get(i)).and_then(to_float),
        })
        .collect()
}

fn valuation_series(table: &Table, column: &str) -> Vec<f64> {
    let Some(idx) = table.column_index(column) else {
        return Vec::new();
    };
    table.rows.iter().filter_map(|row| row.get(idx).and_then(to_float)).collect()
}

#[async_trait]
impl StockFactorComputer for FundamentalFactorComputer {
    async fn compute(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> StockFactorRow {
        let mut row = StockFactorRow::empty(code, trade_date);

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(table) = self.fetch_financials(code, trade_date).await {
            let reports = financial_reports(&table);
            if let Some(latest) = reports.last() {
                row.roe = latest.roe;
                row.gross_margin = latest.gross_margin;
                row.ocf_to_profit = latest.ocf_to_profit;
                row.debt_ratio = latest.debt_ratio;
            }

            if reports.len() >= 2 {
                let prior = &reports[reports.len() - 2];
                let latest = reports.last().unwrap();
                row.roe_yoy = match (latest.roe, prior.roe) {
                    (Some(r), Some(p)) => Some(r - p),
                    _ => None,
                };
                row.revenue_growth_yoy = match (latest.revenue, prior.revenue) {
                    (Some(r), Some(p)) => yoy_growth(r, p),
                    _ => None,
                };
                row.profit_growth_yoy = match (latest.net_profit, prior.net_profit) {
                    (Some(r), Some(p)) => yoy_growth(r, p),
                    _ => None,
                };
            }

            let margins: Vec<f64> = reports.iter().rev().take(3).filter_map(|r| r.gross_margin).collect();
            if margins.len() == 3 {
                row.gross_margin_stability = inverse_coefficient_of_variation(&margins);
            }

            if reports.len() >= 4 {
                let three_years_ago = &reports[reports.len() - 4];
                let latest = reports.last().unwrap();
                row.revenue_cagr_3y = match (three_years_ago.revenue, latest.revenue) {
                    (Some(s), Some(e)) => cagr(s, e, 3.0),
                    _ => None,
                };
                row.profit_cagr_3y = match (three_years_ago.net_profit, latest.net_profit) {
                    (Some(s), Some(e)) => cagr(s, e, 3.0),
                    _ => None,
                };
            }
        }

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(table) = self.fetch_valuation_history(code, trade_date).await {
            let pe_series = valuation_series(&table, "pe");
            let pb_series = valuation_series(&table, "pb");

            if let Some(&current_pe) = pe_series.last() {
                row.pe_percentile = percentile_rank(&pe_series, current_pe);
                row.peg_ratio = match row.profit_growth_yoy {
                    Some(growth) if growth > 0.0 => Some(current_pe / growth),
                    _ => None,
                };
            }
            if let Some(&current_pb) = pb_series.last() {
                row.pb_percentile = percentile_rank(&pb_series, current_pb);
            }
        }

        row
    }

    fn name(&self) -> &'static str {
        "fundamental"
    }
}
