use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use factor_core::coerce::to_float;
use factor_core::{CancelToken, StockFactorComputer, StockFactorRow, Table, TradeDate, UpstreamSubstrate};

const CALL_DEADLINE: Duration = Duration::from_secs(10);
const FLOW_DAYS: usize = 5;
const TREND_DAYS: usize = 10;
/// Extra calendar days of slack so `TREND_DAYS` trading sessions are covered
/// even across weekends/holidays.
const LOOKBACK_PAD_DAYS: i64 = 10;

/// Stock sentiment/money-flow factor group (§4.3): institutional main-flow
/// accumulation, its trend, northbound flow, and retail positioning.
pub struct SentimentFactorComputer {
    substrate: Arc<dyn UpstreamSubstrate>,
    provider: String,
}

impl SentimentFactorComputer {
    pub fn new(substrate: Arc<dyn UpstreamSubstrate>, provider: impl Into<String>) -> Self {
        Self { substrate, provider: provider.into() }
    }

    fn start_date(trade_date: TradeDate) -> TradeDate {
        TradeDate::from_naive(trade_date.naive() - chrono::Duration::days(TREND_DAYS as i64 + LOOKBACK_PAD_DAYS))
    }

    async fn fetch_moneyflow(&self, code: &str, trade_date: TradeDate) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("start_date".to_string(), json!(Self::start_date(trade_date).to_wire()));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        self.substrate.call(&self.provider, "stock_moneyflow", args, CALL_DEADLINE).await.ok()
    }

    async fn fetch_hsgt(&self, trade_date: TradeDate) -> Option<Table> {
        let mut args = serde_json::Map::new();
        args.insert("start_date".to_string(), json!(Self::start_date(trade_date).to_wire()));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        self.substrate.call(&self.provider, "moneyflow_hsgt", args, CALL_DEADLINE).await.ok()
    }
}

struct FlowRow {
    date: TradeDate,
    buy_lg: f64,
    sell_lg: f64,
    buy_elg: f64,
    sell_elg: f64,
    buy_sm: f64,
    sell_sm: f64,
}

fn parse_flow_rows(table: &Table) -> Vec<FlowRow> {
    let idx_date = table.column_index("trade_date");
    let idx_buy_lg = table.column_index("buy_lg_vol");
    let idx_sell_lg = table.column_index("sell_lg_vol");
    let idx_buy_elg = table.column_index("buy_elg_vol");
    let idx_sell_elg = table.column_index("sell_elg_vol");
    let idx_buy_sm = table.column_index("buy_sm_vol");
    let idx_sell_sm = table.column_index("sell_sm_vol");

    let Some(idx_date) = idx_date else { return Vec::new() };

    let mut rows: Vec<FlowRow> = table
        .rows
        .iter()
        .filter_map(|row| {
            let date_str = row.get(idx_date).and_then(factor_core::coerce::to_str)?;
            let date = TradeDate::parse_yyyymmdd(&date_str).or_else(|| TradeDate::parse_storage(&date_str))?;
            Some(FlowRow {
                date,
                buy_lg: idx_buy_lg.and_then(|i| row.get(i)).and_then(to_float).unwrap_or(0.0),
                sell_lg: idx_sell_lg.and_then(|i| row.get(i)).and_then(to_float).unwrap_or(0.0),
                buy_elg: idx_buy_elg.and_then(|i| row.get(i)).and_then(to_float).unwrap_or(0.0),
                sell_elg: idx_sell_elg.and_then(|i| row.get(i)).and_then(to_float).unwrap_or(0.0),
                buy_sm: idx_buy_sm.and_then(|i| row.get(i)).and_then(to_float).unwrap_or(0.0),
                sell_sm: idx_sell_sm.and_then(|i| row.get(i)).and_then(to_float).unwrap_or(0.0),
            })
        })
        .collect();

    rows.sort_by_key(|r| r.date);
    rows
}

fn main_flow(rows: &[FlowRow]) -> f64 {
    rows.iter().map(|r| (r.buy_lg + r.buy_elg) - (r.sell_lg + r.sell_elg)).sum()
}

/// §4.3: 5-day sum of large+extra-large net buy, normalised by average daily
/// large-order buy volume over the window.
fn main_inflow_5d(rows: &[FlowRow]) -> Option<f64> {
    if rows.len() < FLOW_DAYS {
        return None;
    }
    let recent = &rows[rows.len() - FLOW_DAYS..];
    let net = main_flow(recent);
    let avg_buy_vol = recent.iter().map(|r| r.buy_lg + r.buy_elg).sum::<f64>() / FLOW_DAYS as f64;
    if avg_buy_vol <= 0.0 {
        return Some(0.0);
    }
    Some(net / avg_buy_vol)
}

/// §4.3: `50 + 25·clamp((second_half - first_half)/|first_half|, -2, 2)`.
fn main_inflow_trend(rows: &[FlowRow]) -> Option<f64> {
    if rows.len() < TREND_DAYS {
        return None;
    }
    let second_half = &rows[rows.len() - FLOW_DAYS..];
    let first_half = &rows[rows.len() - TREND_DAYS..rows.len() - FLOW_DAYS];

    let first_flow = main_flow(first_half);
    let second_flow = main_flow(second_half);

    if first_flow == 0.0 {
        return Some(if second_flow >= 0.0 { 50.0 } else { 40.0 });
    }

    let trend_ratio = ((second_flow - first_flow) / first_flow.abs()).clamp(-2.0, 2.0);
    Some((50.0 + trend_ratio * 25.0).clamp(0.0, 100.0))
}

/// §4.3: retail sell / (retail buy + retail sell) over the 5-day window.
fn retail_outflow_ratio(rows: &[FlowRow]) -> Option<f64> {
    if rows.len() < FLOW_DAYS {
        return None;
    }
    let recent = &rows[rows.len() - FLOW_DAYS..];
    let buy: f64 = recent.iter().map(|r| r.buy_sm).sum();
    let sell: f64 = recent.iter().map(|r| r.sell_sm).sum();
    if buy + sell <= 0.0 {
        return None;
    }
    Some(sell / (buy + sell))
}

/// §4.3: 5-day northbound sum in millions, mapped linearly to [0,100] centred at 50.
fn north_inflow_5d(table: &Table) -> Option<f64> {
    let idx_date = table.column_index("trade_date")?;
    let idx_north = table.column_index("north_money")?;

    let mut rows: Vec<(TradeDate, f64)> = table
        .rows
        .iter()
        .filter_map(|row| {
            let date_str = row.get(idx_date).and_then(factor_core::coerce::to_str)?;
            let date = TradeDate::parse_yyyymmdd(&date_str).or_else(|| TradeDate::parse_storage(&date_str))?;
            let north = row.get(idx_north).and_then(to_float)?;
            Some((date, north))
        })
        .collect();
    rows.sort_by_key(|(d, _)| *d);

    if rows.len() < FLOW_DAYS {
        return None;
    }
    let total: f64 = rows[rows.len() - FLOW_DAYS..].iter().map(|(_, v)| v).sum();
    Some((50.0 + total / 1000.0).clamp(0.0, 100.0))
}

#[async_trait]
impl StockFactorComputer for SentimentFactorComputer {
    async fn compute(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> StockFactorRow {
        let mut row = StockFactorRow::empty(code, trade_date);

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(table) = self.fetch_moneyflow(code, trade_date).await {
            let flow_rows = parse_flow_rows(&table);
            row.main_inflow_5d = main_inflow_5d(&flow_rows);
            row.main_inflow_trend = main_inflow_trend(&flow_rows);
            row.retail_outflow_ratio = retail_outflow_ratio(&flow_rows);
        }

        if cancel.is_cancelled() {
            return row;
        }
        if let Some(table) = self.fetch_hsgt(trade_date).await {
            row.north_inflow_5d = north_inflow_5d(&table);
        }

        row
    }

    fn name(&self) -> &'static str {
        "sentiment"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow_row(date: TradeDate, buy_lg: f64, sell_lg: f64) -> FlowRow {
        FlowRow { date, buy_lg, sell_lg, buy_elg: 0.0, sell_elg: 0.0, buy_sm: 0.0, sell_sm: 0.0 }
    }

    fn day(n: u32) -> TradeDate {
        TradeDate::parse_storage(&format!("2026-01-{n:02}")).unwrap()
    }

    #[test]
    fn main_inflow_5d_normalises_by_avg_buy_volume() {
        let rows: Vec<FlowRow> = (1..=5).map(|d| flow_row(day(d), 100.0, 50.0)).collect();
        let result = main_inflow_5d(&rows).unwrap();
        assert!((result - 0.5).abs() < 0.001);
    }

    #[test]
    fn main_inflow_trend_neutral_when_first_half_zero() {
        let mut rows: Vec<FlowRow> = (1..=5).map(|d| flow_row(day(d), 0.0, 0.0)).collect();
        rows.extend((6..=10).map(|d| flow_row(day(d), 10.0, 0.0)));
        assert_eq!(main_inflow_trend(&rows), Some(50.0));
    }

    #[test]
    fn retail_outflow_ratio_requires_volume() {
        let rows: Vec<FlowRow> = (1..=5)
            .map(|d| FlowRow { date: day(d), buy_lg: 0.0, sell_lg: 0.0, buy_elg: 0.0, sell_elg: 0.0, buy_sm: 0.0, sell_sm: 0.0 })
            .collect();
        assert_eq!(retail_outflow_ratio(&rows), None);
    }
}
