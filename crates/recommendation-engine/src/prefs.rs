use crate::metadata::StockMetadata;
use factor_core::StockFactorRow;

/// User-supplied filter/boost preferences applied after the quality gate
/// (§4.6 step 4). Every field is optional; a missing preference is simply
/// not enforced, and a preference whose supporting metadata column is
/// unavailable is tolerated rather than treated as a rejection.
#[derive(Debug, Clone, Default)]
pub struct UserPrefs {
    pub exclude_st: bool,
    pub include_industries: Option<Vec<String>>,
    pub exclude_industries: Option<Vec<String>>,
    pub min_roe: Option<f64>,
    pub min_market_cap: Option<f64>,
    pub max_market_cap: Option<f64>,
    pub min_liquidity: Option<f64>,
    pub max_pe: Option<f64>,
    pub require_profitable: bool,
    pub preferred_industries: Option<Vec<String>>,
}

const PREFERRED_INDUSTRY_BOOST: f64 = 1.15;

impl UserPrefs {
    pub fn is_default(&self) -> bool {
        !self.exclude_st
            && self.include_industries.is_none()
            && self.exclude_industries.is_none()
            && self.min_roe.is_none()
            && self.min_market_cap.is_none()
            && self.max_market_cap.is_none()
            && self.min_liquidity.is_none()
            && self.max_pe.is_none()
            && !self.require_profitable
            && self.preferred_industries.is_none()
    }

    /// Whether `row`/`meta` satisfies every configured preference. Missing
    /// data never disqualifies a row by itself — only a known value that
    /// actively violates a preference does.
    pub fn passes(&self, row: &StockFactorRow, meta: Option<&StockMetadata>) -> bool {
        if let Some(min_roe) = self.min_roe {
            if let Some(roe) = row.roe {
                if roe < min_roe {
                    return false;
                }
            }
        }

        if self.require_profitable {
            if let Some(meta) = meta {
                if let Some(pe) = meta.pe {
                    if pe < 0.0 {
                        return false;
                    }
                }
            }
        }

        if let Some(max_pe) = self.max_pe {
            if let Some(meta) = meta {
                if let Some(pe) = meta.pe {
                    if pe > 0.0 && pe > max_pe {
                        return false;
                    }
                }
            }
        }

        let Some(meta) = meta else { return true };

        if self.exclude_st {
            if let Some(name) = &meta.name {
                if is_st_name(name) {
                    return false;
                }
            }
        }

        if let Some(industry) = &meta.industry {
            if let Some(include) = &self.include_industries {
                if !include.iter().any(|i| i == industry) {
                    return false;
                }
            }
            if let Some(exclude) = &self.exclude_industries {
                if exclude.iter().any(|i| i == industry) {
                    return false;
                }
            }
        }

        if let Some(cap) = meta.market_cap {
            if let Some(min) = self.min_market_cap {
                if cap < min {
                    return false;
                }
            }
            if let Some(max) = self.max_market_cap {
                if cap > max {
                    return false;
                }
            }
        }

        if let (Some(min_liquidity), Some(liquidity)) = (self.min_liquidity, meta.liquidity) {
            if liquidity < min_liquidity {
                return false;
            }
        }

        true
    }

    /// Applies the 1.15x preferred-industry boost, re-clamped to [0, 100]
    /// (§4.6 step 4).
    pub fn boosted_score(&self, score: f64, meta: Option<&StockMetadata>) -> f64 {
        let Some(preferred) = &self.preferred_industries else { return score };
        let Some(meta) = meta else { return score };
        let Some(industry) = &meta.industry else { return score };
        if preferred.iter().any(|i| i == industry) {
            (score * PREFERRED_INDUSTRY_BOOST).min(100.0)
        } else {
            score
        }
    }
}

fn is_st_name(name: &str) -> bool {
    name.contains("ST")
}

#[cfg(test)]
mod tests {
    use super::*;
    use factor_core::TradeDate;

    fn row() -> StockFactorRow {
        let mut row = StockFactorRow::empty("600519.SH", TradeDate::parse_storage("2026-01-05").unwrap());
        row.roe = Some(22.0);
        row
    }

    #[test]
    fn default_prefs_pass_everything() {
        let prefs = UserPrefs::default();
        assert!(prefs.is_default());
        assert!(prefs.passes(&row(), None));
    }

    #[test]
    fn min_roe_rejects_low_roe() {
        let prefs = UserPrefs { min_roe: Some(25.0), ..Default::default() };
        assert!(!prefs.passes(&row(), None));
    }

    #[test]
    fn missing_metadata_never_rejects_metadata_only_prefs() {
        let prefs = UserPrefs { exclude_st: true, min_market_cap: Some(1e9), ..Default::default() };
        assert!(prefs.passes(&row(), None));
    }

    #[test]
    fn st_name_excluded_when_requested() {
        let prefs = UserPrefs { exclude_st: true, ..Default::default() };
        let meta = StockMetadata { name: Some("*ST华仪".to_string()), industry: None, market_cap: None, liquidity: None, pe: None };
        assert!(!prefs.passes(&row(), Some(&meta)));
    }

    #[test]
    fn preferred_industry_boosts_and_clamps() {
        let prefs = UserPrefs { preferred_industries: Some(vec!["白酒".to_string()]), ..Default::default() };
        let meta = StockMetadata { name: None, industry: Some("白酒".to_string()), market_cap: None, liquidity: None, pe: None };
        assert_eq!(prefs.boosted_score(95.0, Some(&meta)), 100.0);
        assert_eq!(prefs.boosted_score(50.0, Some(&meta)), 57.5);
    }
}
