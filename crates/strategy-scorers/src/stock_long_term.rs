use factor_core::{Scorer, StockFactorRow};

use crate::weighting::{finalize, weighted_composite};

const W_QUALITY: f64 = 0.35;
const W_GROWTH: f64 = 0.30;
const W_VALUATION: f64 = 0.25;
const W_MOAT: f64 = 0.10;

const QUALITY_GATE_ROE_FLOOR: f64 = 10.0;
const QUALITY_GATE_CAP: f64 = 30.0;

/// §4.4 long-term stock scorer: quality 35% / growth 30% / valuation 25% /
/// moat 10%, with a hard ROE quality gate that caps the final score at 30.
pub struct LongTermStockScorer;

impl LongTermStockScorer {
    pub fn new() -> Self {
        Self
    }

    fn quality_subscore(row: &StockFactorRow) -> Option<f64> {
        let roe_score = row.roe.map(|roe| (roe * 3.0).clamp(0.0, 100.0));
        let margin_score = row.gross_margin.map(|m| (m * 1.5).clamp(0.0, 100.0));
        let ocf_score = row.ocf_to_profit.map(|o| (o * 80.0).clamp(0.0, 100.0));
        let debt_score = row.debt_ratio.map(|d| (100.0 - d).clamp(0.0, 100.0));
        weighted_composite(&[(0.35, roe_score), (0.25, margin_score), (0.20, ocf_score), (0.20, debt_score)])
    }

    fn growth_rate_score(rate: f64) -> f64 {
        (50.0 + rate * 2.0).clamp(0.0, 100.0)
    }

    fn growth_subscore(row: &StockFactorRow) -> Option<f64> {
        weighted_composite(&[
            (0.30, row.profit_growth_yoy.map(Self::growth_rate_score)),
            (0.25, row.revenue_growth_yoy.map(Self::growth_rate_score)),
            (0.25, row.profit_cagr_3y.map(Self::growth_rate_score)),
            (0.20, row.revenue_cagr_3y.map(Self::growth_rate_score)),
        ])
    }

    /// §4.4: PEG < 1 is rewarded (95 at <0.5, 40 at 2, ≤20 above); growth ≤ 0
    /// makes the ratio undefined and yields a flat 20.
    fn peg_score(row: &StockFactorRow) -> Option<f64> {
        if let Some(growth) = row.profit_growth_yoy {
            if growth <= 0.0 {
                return Some(20.0);
            }
        }
        let peg = row.peg_ratio?;
        let score = if peg < 0.5 {
            95.0
        } else if peg <= 2.0 {
            95.0 + (peg - 0.5) / 1.5 * (40.0 - 95.0)
        } else {
            20.0
        };
        Some(score)
    }

    fn valuation_subscore(row: &StockFactorRow) -> Option<f64> {
        let peg_score = Self::peg_score(row);
        let pe_score = row.pe_percentile.map(|p| (100.0 - p).clamp(0.0, 100.0));
        let pb_score = row.pb_percentile.map(|p| (100.0 - p).clamp(0.0, 100.0));
        weighted_composite(&[(0.70, peg_score), (0.15, pe_score), (0.15, pb_score)])
    }

    /// No standalone "moat" factor is computed; durable margin stability is
    /// the closest available proxy for competitive durability.
    fn moat_subscore(row: &StockFactorRow) -> Option<f64> {
        row.gross_margin_stability
    }

    fn key_factors(row: &StockFactorRow) -> Vec<String> {
        let mut tags = Vec::new();

        if let Some(roe) = row.roe {
            if roe >= 20.0 {
                tags.push(format!("ROE优秀 ({roe:.1}%)"));
            } else if roe < QUALITY_GATE_ROE_FLOOR {
                tags.push(format!("ROE不足 ({roe:.1}%, 未通过质量门槛)"));
            }
        }
        if let Some(peg) = row.peg_ratio {
            if peg < 1.0 {
                tags.push(format!("估值吸引力强 (PEG={peg:.2})"));
            } else if peg > 2.0 {
                tags.push(format!("估值偏贵 (PEG={peg:.2})"));
            }
        }
        if let Some(growth) = row.profit_growth_yoy {
            if growth >= 20.0 {
                tags.push(format!("盈利增长强劲 (+{growth:.1}%)"));
            }
        }
        if let Some(stability) = row.gross_margin_stability {
            if stability >= 70.0 {
                tags.push("毛利率稳定，护城河较深".to_string());
            }
        }
        if let Some(debt) = row.debt_ratio {
            if debt <= 40.0 {
                tags.push(format!("负债率健康 ({debt:.1}%)"));
            }
        }

        tags.truncate(5);
        tags
    }
}

impl Default for LongTermStockScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer<StockFactorRow> for LongTermStockScorer {
    fn score(&self, row: &StockFactorRow) -> Option<f64> {
        let quality = Self::quality_subscore(row);
        let growth = Self::growth_subscore(row);
        let valuation = Self::valuation_subscore(row);
        let moat = Self::moat_subscore(row);

        let composite = weighted_composite(&[
            (W_QUALITY, quality),
            (W_GROWTH, growth),
            (W_VALUATION, valuation),
            (W_MOAT, moat),
        ])?;

        let gated = match row.roe {
            Some(roe) if roe < QUALITY_GATE_ROE_FLOOR => composite.min(QUALITY_GATE_CAP),
            _ => composite,
        };
        Some(finalize(gated))
    }

    fn key_factors(&self, row: &StockFactorRow) -> Vec<String> {
        Self::key_factors(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factor_core::TradeDate;

    fn sample_row(roe: f64) -> StockFactorRow {
        let trade_date = TradeDate::parse_storage("2026-01-28").unwrap();
        let mut row = StockFactorRow::empty("600519", trade_date);
        row.roe = Some(roe);
        row.gross_margin = Some(60.0);
        row.ocf_to_profit = Some(1.0);
        row.debt_ratio = Some(30.0);
        row.profit_growth_yoy = Some(18.0);
        row.revenue_growth_yoy = Some(15.0);
        row.profit_cagr_3y = Some(20.0);
        row.revenue_cagr_3y = Some(15.0);
        row.peg_ratio = Some(0.8);
        row.pe_percentile = Some(20.0);
        row.pb_percentile = Some(25.0);
        row.gross_margin_stability = Some(80.0);
        row
    }

    #[test]
    fn s1_scenario_scores_high_confidence() {
        let scorer = LongTermStockScorer::new();
        let row = sample_row(22.0);
        let score = scorer.score(&row).unwrap();
        assert!(score >= 75.0, "expected high score, got {score}");

        let tags = scorer.key_factors(&row);
        assert!(tags.contains(&"ROE优秀 (22.0%)".to_string()));
        assert!(tags.contains(&"估值吸引力强 (PEG=0.80)".to_string()));
    }

    #[test]
    fn s2_scenario_quality_gate_caps_score() {
        let scorer = LongTermStockScorer::new();
        let row = sample_row(8.0);
        let score = scorer.score(&row).unwrap();
        assert!(score <= 30.0, "expected gated score, got {score}");
    }

    #[test]
    fn negative_growth_peg_yields_twenty() {
        let mut row = sample_row(22.0);
        row.profit_growth_yoy = Some(-5.0);
        assert_eq!(LongTermStockScorer::peg_score(&row), Some(20.0));
    }
}
