//! Risk/return ratio helpers, generalised from the teacher's quant-analysis
//! engine to operate on fund NAV series rather than equity closes.

use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Annualised risk-free rate used throughout the fund risk metrics.
pub const RISK_FREE_RATE: f64 = 0.025;

/// Daily simple returns from a price/NAV series.
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

/// Annualised volatility, as a percentage.
pub fn volatility(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let std_dev = returns.std_dev();
    Some(std_dev * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

/// Annualised Sharpe ratio against [`RISK_FREE_RATE`].
pub fn sharpe_ratio(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let std_dev = returns.std_dev();
    if std_dev == 0.0 {
        return None;
    }
    let annualized_return = returns.mean() * TRADING_DAYS_PER_YEAR;
    let annualized_vol = std_dev * TRADING_DAYS_PER_YEAR.sqrt();
    Some((annualized_return - RISK_FREE_RATE) / annualized_vol)
}

/// Annualised Sortino ratio: downside deviation only.
pub fn sortino_ratio(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let mean_return = returns.mean();
    let annualized_return = mean_return * TRADING_DAYS_PER_YEAR;
    let daily_rf = RISK_FREE_RATE / TRADING_DAYS_PER_YEAR;

    let downside: Vec<f64> = returns.iter().filter(|&&r| r < daily_rf).map(|&r| (r - daily_rf).powi(2)).collect();
    if downside.is_empty() {
        return Some(3.0);
    }
    let downside_variance = downside.iter().sum::<f64>() / returns.len() as f64;
    let downside_dev = downside_variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt();
    if downside_dev == 0.0 {
        return Some(3.0);
    }
    Some((annualized_return - RISK_FREE_RATE) / downside_dev)
}

/// Maximum drawdown over a price/NAV series, as a positive percentage.
pub fn max_drawdown(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let mut peak = prices[0];
    let mut worst = 0.0f64;
    for &p in prices {
        if p > peak {
            peak = p;
        }
        let dd = (peak - p) / peak;
        if dd > worst {
            worst = dd;
        }
    }
    Some(worst * 100.0)
}

/// Calmar ratio: annualised return over (fractional) max drawdown.
pub fn calmar_ratio(returns: &[f64], max_dd_pct: f64) -> Option<f64> {
    if returns.is_empty() || max_dd_pct <= 0.0 {
        return None;
    }
    let annualized_return = returns.mean() * TRADING_DAYS_PER_YEAR;
    Some(annualized_return / (max_dd_pct / 100.0))
}

/// Average number of trading days to recover from each peak-to-trough
/// drawdown episode back to the prior peak. Episodes that never recover by
/// the end of the series are excluded (censored, not penalised).
pub fn avg_recovery_days(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }
    let mut peak = prices[0];
    let mut peak_idx = 0usize;
    let mut in_drawdown = false;
    let mut recoveries = Vec::new();

    for (i, &p) in prices.iter().enumerate().skip(1) {
        if p >= peak {
            if in_drawdown {
                recoveries.push((i - peak_idx) as f64);
                in_drawdown = false;
            }
            peak = p;
            peak_idx = i;
        } else {
            in_drawdown = true;
        }
    }

    if recoveries.is_empty() {
        return None;
    }
    Some(recoveries.iter().sum::<f64>() / recoveries.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_drawdown_basic() {
        let prices = vec![100.0, 110.0, 90.0, 95.0, 120.0];
        let dd = max_drawdown(&prices).unwrap();
        assert!((dd - 18.1818).abs() < 0.01);
    }

    #[test]
    fn avg_recovery_days_counts_full_episodes_only() {
        let prices = vec![100.0, 80.0, 100.0, 70.0];
        let days = avg_recovery_days(&prices).unwrap();
        assert!((days - 2.0).abs() < 0.01);
    }

    #[test]
    fn sortino_excellent_when_no_downside() {
        let returns = vec![0.01, 0.02, 0.015];
        assert_eq!(sortino_ratio(&returns), Some(3.0));
    }

    #[test]
    fn volatility_nonnegative() {
        let returns = vec![0.01, -0.02, 0.015, -0.005];
        assert!(volatility(&returns).unwrap() >= 0.0);
    }
}
