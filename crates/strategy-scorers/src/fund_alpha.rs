use factor_core::{FundFactorRow, Scorer};

use crate::tiers::{alpha_bear_tier, alpha_bull_tier, calmar_tier, drawdown_tier, recovery_tier, sharpe_like_tier, tenure_tier};
use crate::weighting::{finalize, weighted_composite};

const W_RISK_ADJUSTED: f64 = 0.35;
const W_DRAWDOWN: f64 = 0.25;
const W_MANAGER: f64 = 0.25;
const W_HOLDINGS: f64 = 0.15;

const HOLDINGS_DEFAULT: f64 = 50.0;

/// §4.4 long-term fund scorer: risk-adjusted 35% / drawdown 25% / manager
/// 25% / holdings 15%.
pub struct FundAlphaScorer;

impl FundAlphaScorer {
    pub fn new() -> Self {
        Self
    }

    fn risk_adjusted_subscore(row: &FundFactorRow) -> Option<f64> {
        weighted_composite(&[
            (0.40, row.sharpe_1y.map(sharpe_like_tier)),
            (0.30, row.sortino_1y.map(sharpe_like_tier)),
            (0.30, row.calmar_1y.map(calmar_tier)),
        ])
    }

    fn drawdown_subscore(row: &FundFactorRow) -> Option<f64> {
        weighted_composite(&[
            (0.60, row.max_drawdown_1y.map(drawdown_tier)),
            (0.40, row.avg_recovery_days.map(recovery_tier)),
        ])
    }

    fn manager_subscore(row: &FundFactorRow) -> Option<f64> {
        weighted_composite(&[
            (0.35, row.manager_tenure_years.map(tenure_tier)),
            (0.25, row.manager_alpha_bull.map(alpha_bull_tier)),
            (0.25, row.manager_alpha_bear.map(alpha_bear_tier)),
            (0.15, row.style_consistency),
        ])
    }

    fn holdings_subscore(row: &FundFactorRow) -> Option<f64> {
        let score = match row.holdings_avg_roe {
            Some(roe) if roe >= 15.0 => 80.0,
            Some(roe) if roe >= 10.0 => 60.0,
            Some(_roe) => 40.0,
            None => HOLDINGS_DEFAULT,
        };
        Some(score)
    }

    fn key_factors(row: &FundFactorRow) -> Vec<String> {
        let mut tags = Vec::new();

        if let Some(sharpe) = row.sharpe_1y {
            if sharpe >= 1.5 {
                tags.push(format!("长期夏普比率优秀 ({sharpe:.2})"));
            } else if sharpe < 0.0 {
                tags.push("长期夏普比率为负".to_string());
            }
        }
        if let Some(dd) = row.max_drawdown_1y {
            if dd < 10.0 {
                tags.push(format!("最大回撤控制良好 ({dd:.1}%)"));
            } else if dd > 30.0 {
                tags.push(format!("回撤风险较大 ({dd:.1}%)"));
            }
        }
        if let Some(tenure) = row.manager_tenure_years {
            if tenure >= 5.0 {
                tags.push(format!("基金经理任期稳定 ({tenure:.1}年)"));
            } else if tenure < 1.0 {
                tags.push(format!("基金经理任期较短 ({tenure:.1}年)"));
            }
        }
        if let Some(r1y) = row.return_1y {
            if r1y >= 20.0 {
                tags.push(format!("近1年收益优秀 (+{r1y:.2}%)"));
            } else if r1y < -10.0 {
                tags.push(format!("近1年回撤较大 ({r1y:.2}%, 风险)"));
            }
        }
        if let Some(div) = row.diversification {
            if div >= 70.0 {
                tags.push("持仓分散度较高".to_string());
            }
        }

        tags.truncate(5);
        tags
    }
}

impl Default for FundAlphaScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer<FundFactorRow> for FundAlphaScorer {
    fn score(&self, row: &FundFactorRow) -> Option<f64> {
        let risk_adjusted = Self::risk_adjusted_subscore(row);
        let drawdown = Self::drawdown_subscore(row);
        let manager = Self::manager_subscore(row);
        let holdings = Self::holdings_subscore(row);

        let composite = weighted_composite(&[
            (W_RISK_ADJUSTED, risk_adjusted),
            (W_DRAWDOWN, drawdown),
            (W_MANAGER, manager),
            (W_HOLDINGS, holdings),
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
        row.sharpe_1y = Some(1.8);
        row.sortino_1y = Some(2.0);
        row.calmar_1y = Some(1.2);
        row.max_drawdown_1y = Some(8.0);
        row.avg_recovery_days = Some(15.0);
        row.manager_tenure_years = Some(6.0);
        row.manager_alpha_bull = Some(1.5);
        row.manager_alpha_bear = Some(0.5);
        row.style_consistency = Some(80.0);
        row.holdings_avg_roe = Some(18.0);
        row.return_1y = Some(25.0);
        row
    }

    #[test]
    fn strong_fund_scores_high() {
        let scorer = FundAlphaScorer::new();
        let score = scorer.score(&sample_row()).unwrap();
        assert!(score >= 75.0, "expected high score, got {score}");
    }

    #[test]
    fn holdings_subscore_tiers_on_roe() {
        let mut row = sample_row();
        row.holdings_avg_roe = Some(5.0);
        assert_eq!(FundAlphaScorer::holdings_subscore(&row), Some(40.0));

        row.holdings_avg_roe = Some(12.0);
        assert_eq!(FundAlphaScorer::holdings_subscore(&row), Some(60.0));

        row.holdings_avg_roe = None;
        assert_eq!(FundAlphaScorer::holdings_subscore(&row), Some(50.0));
    }

    #[test]
    fn key_factors_flags_excellent_sharpe() {
        let scorer = FundAlphaScorer::new();
        let tags = scorer.key_factors(&sample_row());
        assert!(tags.iter().any(|t| t.contains("夏普比率优秀")));
    }
}
