//! Pure numeric helpers shared by the fundamental factor computer. Kept
//! free of upstream/table concerns so they can be unit-tested in isolation.

/// Year-over-year growth in percent: `(current - prior) / |prior| * 100`.
/// `None` if `prior` is zero (undefined growth base).
pub fn yoy_growth(current: f64, prior: f64) -> Option<f64> {
    if prior == 0.0 {
        return None;
    }
    Some((current - prior) / prior.abs() * 100.0)
}

/// Compound annual growth rate over `years`, in percent. `None` unless both
/// endpoints are strictly positive (a CAGR over a sign change is undefined).
pub fn cagr(start: f64, end: f64, years: f64) -> Option<f64> {
    if start <= 0.0 || end <= 0.0 || years <= 0.0 {
        return None;
    }
    Some(((end / start).powf(1.0 / years) - 1.0) * 100.0)
}

/// Inverse coefficient of variation across a series, as a stability score:
/// higher means less relative dispersion. `None` on fewer than 2 points or a
/// non-positive mean. The ratio is capped to keep a near-zero stdev from
/// producing an unbounded value.
pub fn inverse_coefficient_of_variation(series: &[f64]) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let variance = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / series.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Some(100.0);
    }
    let cv = std_dev / mean;
    Some((1.0 / cv).min(100.0))
}

/// Rank of `current` within `history` (inclusive), as a 0-100 percentile:
/// the fraction of historical observations at or below `current`.
pub fn percentile_rank(history: &[f64], current: f64) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    let at_or_below = history.iter().filter(|&&v| v <= current).count();
    Some(at_or_below as f64 / history.len() as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yoy_growth_basic() {
        assert_eq!(yoy_growth(110.0, 100.0), Some(10.0));
        assert_eq!(yoy_growth(90.0, 100.0), Some(-10.0));
        assert_eq!(yoy_growth(5.0, 0.0), None);
    }

    #[test]
    fn cagr_requires_positive_endpoints() {
        let g = cagr(100.0, 133.1, 3.0).unwrap();
        assert!((g - 10.0).abs() < 0.1);
        assert_eq!(cagr(-10.0, 20.0, 3.0), None);
        assert_eq!(cagr(10.0, -20.0, 3.0), None);
    }

    #[test]
    fn cv_stability_higher_for_steadier_series() {
        let steady = inverse_coefficient_of_variation(&[20.0, 20.5, 19.8, 20.2]).unwrap();
        let volatile = inverse_coefficient_of_variation(&[5.0, 25.0, 10.0, 30.0]).unwrap();
        assert!(steady > volatile);
    }

    #[test]
    fn percentile_rank_basic() {
        let history = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile_rank(&history, 30.0), Some(60.0));
        assert_eq!(percentile_rank(&history, 5.0), Some(0.0));
        assert_eq!(percentile_rank(&history, 50.0), Some(100.0));
    }
}
