/// Static fund-code -> linked-ETF-code map, covering the common ETF
/// linkage funds that don't self-identify cleanly through holdings (the
/// fast path). Mirrors the maintained mapping table used alongside the
/// holdings-based detector.
const ETF_LINKAGE_MAP: &[(&str, &str)] = &[
    ("008888", "159995"),
    ("008887", "159995"),
    ("110026", "159915"),
    ("003957", "159915"),
    ("007339", "510300"),
    ("007340", "510300"),
    ("110020", "510050"),
    ("004746", "510050"),
    ("000961", "510500"),
    ("000962", "510500"),
    ("016708", "516650"),
    ("016707", "516650"),
    ("018897", "562950"),
    ("018896", "562950"),
];

const TOP_HOLDING_WEIGHT_FLOOR: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionMethod {
    Map,
    Holdings,
    None,
}

#[derive(Debug, Clone)]
pub struct EtfLinkageResult {
    pub is_etf_linkage: bool,
    pub etf_code: Option<String>,
    pub method: DetectionMethod,
}

#[derive(Debug, Clone)]
pub struct TopHolding {
    pub code: String,
    pub weight_pct: f64,
}

/// Name-based heuristic: funds that advertise themselves as an ETF feeder
/// ("ETF联接") or ETF-index clone ("ETF指数") in their display name.
pub fn is_etf_linkage_fund(fund_name: &str) -> bool {
    if fund_name.is_empty() {
        return false;
    }
    fund_name.contains("ETF联接") || fund_name.to_lowercase().contains("etf联接") || fund_name.contains("ETF指数")
}

/// A fund's single dominant holding (>80% of net value) whose code looks
/// like an ETF ticker (6 digits starting with 1 or 5) is treated as its
/// linked ETF.
pub fn etf_code_from_holdings(holdings: &[TopHolding]) -> Option<String> {
    let top = holdings.first()?;
    if top.weight_pct <= TOP_HOLDING_WEIGHT_FLOOR {
        return None;
    }
    let code = &top.code;
    if code.len() == 6 && code.starts_with(['1', '5']) {
        Some(code.clone())
    } else {
        None
    }
}

/// Detects whether `fund_code`/`fund_name` is an ETF-linkage fund and, if
/// so, resolves the underlying ETF code: static map first (fastest), then
/// dominant-holding inference (§4.9 path 2).
pub fn detect(fund_code: &str, fund_name: &str, holdings: Option<&[TopHolding]>) -> EtfLinkageResult {
    if !is_etf_linkage_fund(fund_name) {
        return EtfLinkageResult { is_etf_linkage: false, etf_code: None, method: DetectionMethod::None };
    }

    if let Some((_, etf_code)) = ETF_LINKAGE_MAP.iter().find(|(code, _)| *code == fund_code) {
        return EtfLinkageResult { is_etf_linkage: true, etf_code: Some(etf_code.to_string()), method: DetectionMethod::Map };
    }

    if let Some(holdings) = holdings {
        if let Some(etf_code) = etf_code_from_holdings(holdings) {
            return EtfLinkageResult { is_etf_linkage: true, etf_code: Some(etf_code), method: DetectionMethod::Holdings };
        }
    }

    EtfLinkageResult { is_etf_linkage: true, etf_code: None, method: DetectionMethod::None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_lookup_wins_over_holdings() {
        let result = detect("008888", "华夏国证半导体芯片ETF联接C", None);
        assert!(result.is_etf_linkage);
        assert_eq!(result.etf_code.as_deref(), Some("159995"));
        assert_eq!(result.method, DetectionMethod::Map);
    }

    #[test]
    fn holdings_path_requires_dominant_etf_like_holding() {
        let holdings = vec![TopHolding { code: "510300".to_string(), weight_pct: 92.0 }];
        let result = detect("999999", "某某ETF联接基金", Some(&holdings));
        assert_eq!(result.etf_code.as_deref(), Some("510300"));
        assert_eq!(result.method, DetectionMethod::Holdings);
    }

    #[test]
    fn non_dominant_holding_does_not_qualify() {
        let holdings = vec![TopHolding { code: "510300".to_string(), weight_pct: 40.0 }];
        let result = detect("999999", "某某ETF联接基金", Some(&holdings));
        assert_eq!(result.etf_code, None);
    }

    #[test]
    fn non_linkage_name_short_circuits() {
        let result = detect("000001", "普通股票型基金", None);
        assert!(!result.is_etf_linkage);
    }
}
