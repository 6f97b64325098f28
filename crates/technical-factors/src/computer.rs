use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use factor_core::coerce::to_float;
use factor_core::{Bar, CancelToken, StockFactorComputer, StockFactorRow, Table, TradeDate, UpstreamSubstrate};

use crate::indicators::{avg_volume, bollinger_bands, finite_or, macd, rsi, sma};

const CALL_DEADLINE: Duration = Duration::from_secs(10);
const HISTORY_LOOKBACK: u32 = 90;

/// Stock technical factor group (§4.3): consolidation/volume-precursor/MA
/// convergence/RSI/MACD/Bollinger, derived purely from recent OHLCV history.
pub struct TechnicalFactorComputer {
    substrate: Arc<dyn UpstreamSubstrate>,
    provider: String,
}

impl TechnicalFactorComputer {
    pub fn new(substrate: Arc<dyn UpstreamSubstrate>, provider: impl Into<String>) -> Self {
        Self { substrate, provider: provider.into() }
    }

    async fn fetch_bars(&self, code: &str, trade_date: TradeDate) -> Option<Vec<Bar>> {
        let mut args = serde_json::Map::new();
        args.insert("code".to_string(), json!(code));
        args.insert("end_date".to_string(), json!(trade_date.to_wire()));
        args.insert("limit".to_string(), json!(HISTORY_LOOKBACK));

        let table = self
            .substrate
            .call(&self.provider, "stock_daily_ohlcv", args, CALL_DEADLINE)
            .await
            .ok()?;

        Some(table_to_bars(&table))
    }
}

fn table_to_bars(table: &Table) -> Vec<Bar> {
    let idx_date = table.column_index("trade_date");
    let idx_open = table.column_index("open");
    let idx_high = table.column_index("high");
    let idx_low = table.column_index("low");
    let idx_close = table.column_index("close");
    let idx_volume = table.column_index("volume");

    let (Some(d), Some(o), Some(h), Some(l), Some(c), Some(v)) = (idx_date, idx_open, idx_high, idx_low, idx_close, idx_volume) else {
        return Vec::new();
    };

    let mut bars: Vec<(TradeDate, Bar)> = table
        .rows
        .iter()
        .filter_map(|row| {
            let date_str = row.get(d).and_then(factor_core::coerce::to_str)?;
            let date = TradeDate::parse_yyyymmdd(&date_str).or_else(|| TradeDate::parse_storage(&date_str))?;
            let open = row.get(o).and_then(to_float)?;
            let high = row.get(h).and_then(to_float)?;
            let low = row.get(l).and_then(to_float)?;
            let close = row.get(c).and_then(to_float)?;
            let volume = row.get(v).and_then(to_float).unwrap_or(0.0);
            Some((
                date,
                Bar { timestamp: date.naive().and_hms_opt(0, 0, 0).unwrap().and_utc(), open, high, low, close, volume },
            ))
        })
        .collect();

    bars.sort_by_key(|(d, _)| *d);
    bars.into_iter().map(|(_, b)| b).collect()
}

/// Narrower and more sustained recent range => higher score.
fn consolidation_score(bars: &[Bar], lookback: usize) -> Option<f64> {
    if bars.len() < lookback {
        return None;
    }
    let window = &bars[bars.len() - lookback..];
    let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let mean_close = window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64;
    if mean_close <= 0.0 {
        return None;
    }
    let range_pct = (high - low) / mean_close * 100.0;
    Some(finite_or((100.0 - range_pct * 4.0).clamp(0.0, 100.0), 50.0))
}

/// Rising average volume on small-bodied candles -- an accumulation signature.
fn volume_precursor(bars: &[Bar], window: usize) -> Option<f64> {
    if bars.len() < window * 2 {
        return None;
    }
    let recent = avg_volume(bars, window)?;
    let prior_slice = &bars[bars.len() - window * 2..bars.len() - window];
    let prior_avg = prior_slice.iter().map(|b| b.volume).sum::<f64>() / window as f64;
    if prior_avg <= 0.0 {
        return None;
    }
    let vol_ratio = recent / prior_avg;

    let recent_bars = &bars[bars.len() - window..];
    let small_body_frac = recent_bars
        .iter()
        .filter(|b| {
            let range = b.high - b.low;
            range > 0.0 && (b.close - b.open).abs() / range < 0.4
        })
        .count() as f64
        / recent_bars.len() as f64;

    let base = (50.0 + (vol_ratio - 1.0) * 50.0).clamp(0.0, 100.0);
    Some(finite_or(base * (0.5 + 0.5 * small_body_frac), 50.0))
}

/// Rises as 5/10/20/60-day moving averages compress toward one another.
fn ma_convergence(closes: &[f64]) -> Option<f64> {
    if closes.len() < 60 {
        return None;
    }
    let price = *closes.last()?;
    if price <= 0.0 {
        return None;
    }
    let periods = [5usize, 10, 20, 60];
    let mas: Vec<f64> = periods.iter().filter_map(|&p| sma(closes, p).last().copied()).collect();
    if mas.len() != periods.len() {
        return None;
    }
    let max_ma = mas.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_ma = mas.iter().cloned().fold(f64::INFINITY, f64::min);
    let spread_pct = (max_ma - min_ma) / price * 100.0;
    Some(finite_or((100.0 - spread_pct * 10.0).clamp(0.0, 100.0), 50.0))
}

fn macd_signal(closes: &[f64]) -> Option<f64> {
    let price = *closes.last()?;
    if price <= 0.0 {
        return None;
    }
    let result = macd(closes, 12, 26, 9);
    let hist = *result.histogram.last()?;
    let normalized = (hist / price * 1000.0).clamp(-50.0, 50.0);
    Some(finite_or(50.0 + normalized, 50.0))
}

fn bollinger_position(closes: &[f64]) -> Option<f64> {
    let bb = bollinger_bands(closes, 20, 2.0);
    let upper = *bb.upper.last()?;
    let lower = *bb.lower.last()?;
    let price = *closes.last()?;
    if (upper - lower).abs() < f64::EPSILON {
        return Some(50.0);
    }
    Some(finite_or(((price - lower) / (upper - lower) * 100.0).clamp(0.0, 100.0), 50.0))
}

#[async_trait]
impl StockFactorComputer for TechnicalFactorComputer {
    async fn compute(&self, code: &str, trade_date: TradeDate, cancel: &CancelToken) -> StockFactorRow {
        let mut row = StockFactorRow::empty(code, trade_date);

        if cancel.is_cancelled() {
            return row;
        }
        let Some(bars) = self.fetch_bars(code, trade_date).await else {
            return row;
        };
        if bars.is_empty() {
            return row;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        row.consolidation_score = consolidation_score(&bars, 20);
        row.volume_precursor = volume_precursor(&bars, 10);
        row.ma_convergence = ma_convergence(&closes);
        row.rsi = rsi(&closes, 14).last().copied();
        row.macd_signal = macd_signal(&closes);
        row.bollinger_position = bollinger_position(&closes);

        row
    }

    fn name(&self) -> &'static str {
        "technical"
    }
}
