use factor_core::Recommendation;

/// Aggregate outcome stats for a `rec_type` over some set of closed
/// recommendations (§4.8).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Aggregation {
    pub count: usize,
    pub hit_rate_target: f64,
    pub hit_rate_stop: f64,
    pub mean_return_30d: f64,
    pub median_return_30d: f64,
}

/// Computes aggregation stats from already-filtered recommendation records.
/// Only records with a `final_return` (i.e. evaluated at 30d) contribute —
/// records still pending or at the 7d checkpoint are excluded rather than
/// counted as zero.
pub fn aggregate(records: &[Recommendation]) -> Aggregation {
    let closed: Vec<&Recommendation> = records.iter().filter(|r| r.final_return.is_some()).collect();
    if closed.is_empty() {
        return Aggregation::default();
    }

    let count = closed.len();
    let hit_target = closed.iter().filter(|r| r.hit_target == Some(true)).count();
    let hit_stop = closed.iter().filter(|r| r.hit_stop == Some(true)).count();

    let mut returns: Vec<f64> = closed.iter().filter_map(|r| r.final_return).collect();
    returns.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let median = if returns.len() % 2 == 0 {
        let mid = returns.len() / 2;
        (returns[mid - 1] + returns[mid]) / 2.0
    } else {
        returns[returns.len() / 2]
    };

    Aggregation {
        count,
        hit_rate_target: hit_target as f64 / count as f64,
        hit_rate_stop: hit_stop as f64 / count as f64,
        mean_return_30d: mean,
        median_return_30d: median,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factor_core::{EvaluationStatus, RecType, TradeDate};

    fn closed(final_return: f64, hit_target: bool, hit_stop: bool) -> Recommendation {
        let mut rec = Recommendation::new("600000.SH", RecType::LongStock, TradeDate::parse_yyyymmdd("20260101").unwrap(), 10.0, 80.0);
        rec.final_return = Some(final_return);
        rec.hit_target = Some(hit_target);
        rec.hit_stop = Some(hit_stop);
        rec.evaluation_status = EvaluationStatus::Evaluated30d;
        rec
    }

    #[test]
    fn ignores_unclosed_records() {
        let mut pending = Recommendation::new("600001.SH", RecType::LongStock, TradeDate::parse_yyyymmdd("20260101").unwrap(), 10.0, 70.0);
        pending.final_return = None;
        let records = vec![pending, closed(5.0, true, false)];
        let agg = aggregate(&records);
        assert_eq!(agg.count, 1);
    }

    #[test]
    fn computes_median_over_even_count() {
        let records = vec![closed(2.0, false, false), closed(4.0, true, false), closed(6.0, true, false), closed(8.0, false, true)];
        let agg = aggregate(&records);
        assert_eq!(agg.count, 4);
        assert!((agg.median_return_30d - 5.0).abs() < 1e-9);
        assert!((agg.hit_rate_target - 0.5).abs() < 1e-9);
        assert!((agg.hit_rate_stop - 0.25).abs() < 1e-9);
    }
}
