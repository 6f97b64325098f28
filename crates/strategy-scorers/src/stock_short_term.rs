use factor_core::{Scorer, StockFactorRow};

use crate::weighting::{finalize, weighted_composite};

const W_TECHNICAL: f64 = 0.40;
const W_ACCUMULATION: f64 = 0.25;
const W_CATALYST: f64 = 0.20;
const W_RISK: f64 = 0.15;

const CATALYST_DEFAULT: f64 = 50.0;

/// §4.4 short-term stock scorer: technical 40% / accumulation 25% /
/// catalyst 20% (no event calendar wired in, so always the neutral default)
/// / risk 15%.
pub struct ShortTermStockScorer;

impl ShortTermStockScorer {
    pub fn new() -> Self {
        Self
    }

    fn technical_subscore(row: &StockFactorRow) -> Option<f64> {
        weighted_composite(&[
            (1.0, row.consolidation_score),
            (1.0, row.volume_precursor),
            (1.0, row.ma_convergence),
            (1.0, row.rsi),
            (1.0, row.macd_signal),
            (1.0, row.bollinger_position),
        ])
    }

    /// Maps the raw normalised flow ratio into [0,100], centred at 50.
    fn inflow_ratio_score(ratio: f64) -> f64 {
        (50.0 + ratio * 100.0).clamp(0.0, 100.0)
    }

    fn accumulation_subscore(row: &StockFactorRow) -> Option<f64> {
        let inflow_score = row.main_inflow_5d.map(Self::inflow_ratio_score);
        let retail_score = row.retail_outflow_ratio.map(|r| ((1.0 - r) * 100.0).clamp(0.0, 100.0));
        weighted_composite(&[(0.45, inflow_score), (0.35, row.main_inflow_trend), (0.20, retail_score)])
    }

    /// Rewards mid-range RSI (35-65) and mid-zone Bollinger (30-70);
    /// penalises extremes in either direction. Low debt is rewarded directly.
    fn risk_subscore(row: &StockFactorRow) -> Option<f64> {
        let rsi_score = row.rsi.map(|rsi| (100.0 - (rsi - 50.0).abs().sub_floor(15.0) * 4.0).clamp(0.0, 100.0));
        let boll_score = row
            .bollinger_position
            .map(|pos| (100.0 - (pos - 50.0).abs().sub_floor(20.0) * 3.0).clamp(0.0, 100.0));
        let debt_score = row.debt_ratio.map(|d| (100.0 - d).clamp(0.0, 100.0));
        weighted_composite(&[(0.35, rsi_score), (0.35, boll_score), (0.30, debt_score)])
    }

    fn key_factors(row: &StockFactorRow) -> Vec<String> {
        let mut tags = Vec::new();

        if let Some(c) = row.consolidation_score {
            if c >= 70.0 {
                tags.push(format!("横盘整理充分 ({c:.1})"));
            }
        }
        if let Some(v) = row.volume_precursor {
            if v >= 65.0 {
                tags.push("量能蓄势迹象明显".to_string());
            }
        }
        if let Some(inflow) = row.main_inflow_5d {
            if inflow > 0.3 {
                tags.push("主力资金净流入显著".to_string());
            }
        }
        if let Some(rsi) = row.rsi {
            if (35.0..=65.0).contains(&rsi) {
                tags.push(format!("RSI处于健康区间 ({rsi:.1})"));
            } else if rsi >= 80.0 {
                tags.push(format!("RSI超买 ({rsi:.1})"));
            } else if rsi <= 20.0 {
                tags.push(format!("RSI超卖 ({rsi:.1})"));
            }
        }
        if let Some(debt) = row.debt_ratio {
            if debt <= 40.0 {
                tags.push(format!("负债率健康 ({debt:.1}%)"));
            } else if debt >= 80.0 {
                tags.push(format!("负债率偏高 ({debt:.1}%, 风险)"));
            }
        }

        tags.truncate(5);
        tags
    }
}

impl Default for ShortTermStockScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension used only by the risk sub-score's "penalise extremes outside
/// a neutral band" shape.
trait SubFloor {
    fn sub_floor(self, floor: f64) -> f64;
}

impl SubFloor for f64 {
    fn sub_floor(self, floor: f64) -> f64 {
        (self - floor).max(0.0)
    }
}

impl Scorer<StockFactorRow> for ShortTermStockScorer {
    fn score(&self, row: &StockFactorRow) -> Option<f64> {
        let technical = Self::technical_subscore(row);
        let accumulation = Self::accumulation_subscore(row);
        let risk = Self::risk_subscore(row);

        let composite = weighted_composite(&[
            (W_TECHNICAL, technical),
            (W_ACCUMULATION, accumulation),
            (W_CATALYST, Some(CATALYST_DEFAULT)),
            (W_RISK, risk),
        ])?;
        Some(finalize(composite))
    }

    fn key_factors(&self, row: &StockFactorRow) -> Vec<String> {
        Self::key_factors(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use factor_core::TradeDate;

    fn sample_row() -> StockFactorRow {
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let mut row = StockFactorRow::empty("600519", trade_date);
        row.consolidation_score = Some(78.0);
        row.volume_precursor = Some(70.0);
        row.ma_convergence = Some(60.0);
        row.rsi = Some(50.0);
        row.macd_signal = Some(55.0);
        row.bollinger_position = Some(50.0);
        row.main_inflow_5d = Some(0.4);
        row.main_inflow_trend = Some(65.0);
        row.retail_outflow_ratio = Some(0.3);
        row.debt_ratio = Some(30.0);
        row.computed_at = Utc::now();
        row
    }

    #[test]
    fn scores_within_bounds() {
        let scorer = ShortTermStockScorer::new();
        let score = scorer.score(&sample_row()).unwrap();
        assert!((0.0..=100.0).contains(&score));
        assert!(score > 60.0);
    }

    #[test]
    fn none_when_row_entirely_empty() {
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let row = StockFactorRow::empty("600519", trade_date);
        let scorer = ShortTermStockScorer::new();
        // Catalyst always contributes its default, so the composite is Some.
        assert!(scorer.score(&row).is_some());
    }

    #[test]
    fn key_factors_mentions_healthy_rsi() {
        let scorer = ShortTermStockScorer::new();
        let tags = scorer.key_factors(&sample_row());
        assert!(tags.iter().any(|t| t.contains("RSI")));
    }
}
