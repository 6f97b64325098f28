//! Continuous, breakpoint-defined curves shared by the fund momentum and
//! alpha scorers. Each mirrors a risk/return ratio whose "good" zone sits
//! well above zero and whose "bad" zone decays toward 0, matching the
//! tiering used by the stand-alone fund strategy modules this was adapted
//! from.

/// Sharpe/Sortino-shaped curve: continuous across its four breakpoints.
pub fn sharpe_like_tier(s: f64) -> f64 {
    if s >= 2.0 {
        95.0
    } else if s >= 1.0 {
        70.0 + (s - 1.0) * 25.0
    } else if s >= 0.5 {
        50.0 + (s - 0.5) * 40.0
    } else if s >= 0.0 {
        30.0 + s * 40.0
    } else {
        (30.0 + s * 15.0).max(0.0)
    }
}

pub fn calmar_tier(c: f64) -> f64 {
    if c >= 1.0 {
        (90.0 + (c - 1.0) * 5.0).min(100.0)
    } else if c >= 0.5 {
        70.0 + (c - 0.5) * 40.0
    } else if c >= 0.0 {
        40.0 + c * 60.0
    } else {
        (40.0 + c * 20.0).max(0.0)
    }
}

/// Lower `dd` (a positive max-drawdown percentage) is better.
pub fn drawdown_tier(dd: f64) -> f64 {
    if dd < 5.0 {
        95.0
    } else if dd < 10.0 {
        80.0 + (10.0 - dd) * 3.0
    } else if dd < 20.0 {
        50.0 + (20.0 - dd) * 3.0
    } else if dd < 30.0 {
        30.0 + (30.0 - dd) * 2.0
    } else {
        (30.0 - (dd - 30.0)).max(0.0)
    }
}

/// Shorter recovery `r` (in days) is better.
pub fn recovery_tier(r: f64) -> f64 {
    if r < 20.0 {
        90.0
    } else if r < 40.0 {
        70.0 + (40.0 - r)
    } else if r < 60.0 {
        50.0 + (60.0 - r)
    } else {
        (50.0 - (r - 60.0) * 0.5).max(20.0)
    }
}

pub fn tenure_tier(t: f64) -> f64 {
    if t >= 5.0 {
        (85.0 + (t - 5.0) * 2.0).min(95.0)
    } else if t >= 3.0 {
        70.0 + (t - 3.0) * 7.5
    } else if t >= 1.0 {
        50.0 + (t - 1.0) * 10.0
    } else {
        30.0 + t * 20.0
    }
}

pub fn alpha_bull_tier(a: f64) -> f64 {
    if a >= 2.0 {
        90.0
    } else if a >= 1.0 {
        70.0 + (a - 1.0) * 20.0
    } else if a >= 0.0 {
        50.0 + a * 20.0
    } else {
        (50.0 + a * 25.0).max(0.0)
    }
}

pub fn alpha_bear_tier(a: f64) -> f64 {
    if a >= 1.0 {
        80.0
    } else if a >= 0.0 {
        60.0 + a * 20.0
    } else {
        (60.0 + a * 30.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharpe_tier_is_continuous_at_breakpoints() {
        assert!((sharpe_like_tier(1.0) - 70.0).abs() < 1e-9);
        assert!((sharpe_like_tier(0.5) - 50.0).abs() < 1e-9);
        assert!((sharpe_like_tier(0.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_tier_rewards_shallow_drawdowns() {
        assert_eq!(drawdown_tier(2.0), 95.0);
        assert!(drawdown_tier(50.0) < drawdown_tier(15.0));
    }

    #[test]
    fn recovery_tier_rewards_fast_recovery() {
        assert_eq!(recovery_tier(10.0), 90.0);
        assert!(recovery_tier(90.0) < recovery_tier(30.0));
    }

    #[test]
    fn tenure_tier_caps_at_ninety_five() {
        assert_eq!(tenure_tier(20.0), 95.0);
    }
}
