use factor_core::{FundFactorRow, Scorer};

use crate::tiers::sharpe_like_tier;
use crate::weighting::{finalize, weighted_composite};

const W_MOMENTUM: f64 = 0.40;
const W_SECTOR: f64 = 0.30;
const W_FLOW: f64 = 0.20;
const W_MANAGER: f64 = 0.10;

/// No sector-rotation or flow data is wired into the fund factor row; both
/// sub-scores default to the neutral midpoint until that data exists.
const SECTOR_DEFAULT: f64 = 50.0;
const FLOW_DEFAULT: f64 = 50.0;
const MANAGER_DEFAULT: f64 = 50.0;

/// §4.4 short-term fund scorer: momentum 40% / sector 30% / flow 20% /
/// manager 10%.
pub struct FundMomentumScorer;

impl FundMomentumScorer {
    pub fn new() -> Self {
        Self
    }

    fn momentum_subscore(row: &FundFactorRow) -> Option<f64> {
        let return_1w_score = row.return_1w.map(|r| (50.0 + r * 10.0).clamp(0.0, 100.0));
        let return_1m_score = row.return_1m.map(|r| (50.0 + r * 5.0).clamp(0.0, 100.0));
        let sharpe_score = row.sharpe_20d.map(sharpe_like_tier);
        weighted_composite(&[(0.30, return_1w_score), (0.40, return_1m_score), (0.30, sharpe_score)])
    }

    fn key_factors(row: &FundFactorRow) -> Vec<String> {
        let mut tags = Vec::new();

        if let Some(r1m) = row.return_1m {
            if r1m >= 5.0 {
                tags.push(format!("近1月收益优秀 (+{r1m:.2}%)"));
            } else if r1m >= 2.0 {
                tags.push("近1月收益良好".to_string());
            } else if r1m < -5.0 {
                tags.push(format!("近1月回撤较大 ({r1m:.2}%, 风险)"));
            }
        }
        if let Some(sharpe) = row.sharpe_20d {
            if sharpe >= 1.5 {
                tags.push(format!("短期夏普比率优秀 ({sharpe:.2})"));
            } else if sharpe < 0.0 {
                tags.push("短期夏普比率为负".to_string());
            }
        }
        if let Some(vol) = row.volatility_20d {
            if vol > 30.0 {
                tags.push(format!("短期波动较大 ({vol:.1}%)"));
            } else if vol < 10.0 {
                tags.push("短期波动较低".to_string());
            }
        }
        if let Some(style) = row.style_consistency {
            if style >= 70.0 {
                tags.push("投资风格保持一致".to_string());
            }
        }

        tags.truncate(5);
        tags
    }
}

impl Default for FundMomentumScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer<FundFactorRow> for FundMomentumScorer {
    fn score(&self, row: &FundFactorRow) -> Option<f64> {
        let momentum = Self::momentum_subscore(row);
        let manager = row.style_consistency.or(Some(MANAGER_DEFAULT));

        let composite = weighted_composite(&[
            (W_MOMENTUM, momentum),
            (W_SECTOR, Some(SECTOR_DEFAULT)),
            (W_FLOW, Some(FLOW_DEFAULT)),
            (W_MANAGER, manager),
        ])?;
        Some(finalize(composite))
    }

    fn key_factors(&self, row: &FundFactorRow) -> Vec<String> {
        Self::key_factors(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factor_core::TradeDate;

    fn sample_row() -> FundFactorRow {
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let mut row = FundFactorRow::empty("510300", trade_date);
        row.return_1w = Some(2.0);
        row.return_1m = Some(6.0);
        row.sharpe_20d = Some(1.8);
        row.volatility_20d = Some(15.0);
        row.style_consistency = Some(75.0);
        row
    }

    #[test]
    fn scores_within_bounds_and_above_neutral() {
        let scorer = FundMomentumScorer::new();
        let score = scorer.score(&sample_row()).unwrap();
        assert!((0.0..=100.0).contains(&score));
        assert!(score > 60.0);
    }

    #[test]
    fn key_factors_flags_strong_monthly_return() {
        let scorer = FundMomentumScorer::new();
        let tags = scorer.key_factors(&sample_row());
        assert!(tags.iter().any(|t| t.contains("近1月收益优秀")));
    }

    #[test]
    fn empty_row_still_scores_via_defaults() {
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let row = FundFactorRow::empty("510300", trade_date);
        let scorer = FundMomentumScorer::new();
        assert!(scorer.score(&row).is_some());
    }
}
