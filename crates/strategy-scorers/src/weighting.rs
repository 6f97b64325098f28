/// §4.4: each sub-score is clamped to [0,100] before weighting; the final
/// score is `Σ(sub_i·w_i) / Σ(w_i_available)` — missing sub-scores re-normalise
/// the weights rather than dragging the composite down. `None` if nothing is
/// available to weight.
pub fn weighted_composite(parts: &[(f64, Option<f64>)]) -> Option<f64> {
    let mut weight_sum = 0.0;
    let mut score_sum = 0.0;
    for (weight, value) in parts {
        if let Some(v) = value {
            let clamped = v.clamp(0.0, 100.0);
            weight_sum += weight;
            score_sum += weight * clamped;
        }
    }
    if weight_sum <= 0.0 {
        None
    } else {
        Some(score_sum / weight_sum)
    }
}

/// Clamp to [0,100] and round to 2 decimals, per §4.4's final-score contract.
pub fn finalize(score: f64) -> f64 {
    (score.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renormalizes_over_missing_subscores() {
        let score = weighted_composite(&[(0.5, Some(100.0)), (0.5, None)]);
        assert_eq!(score, Some(100.0));
    }

    #[test]
    fn none_when_all_missing() {
        assert_eq!(weighted_composite(&[(0.5, None), (0.5, None)]), None);
    }

    #[test]
    fn clamps_out_of_range_subscores() {
        let score = weighted_composite(&[(1.0, Some(150.0))]);
        assert_eq!(score, Some(100.0));
    }

    #[test]
    fn finalize_rounds_to_two_decimals() {
        assert_eq!(finalize(74.5555), 74.56);
    }
}
