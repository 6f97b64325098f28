use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;

use factor_core::coerce::{to_float, to_str};
use factor_core::UpstreamSubstrate;

const CALL_DEADLINE: Duration = Duration::from_secs(10);

/// Thin per-stock metadata (name/industry/market cap/liquidity/valuation)
/// used only to apply user preferences on top of the already-scored
/// FactorRow — never to compute a factor.
#[derive(Debug, Clone, Default)]
pub struct StockMetadata {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub liquidity: Option<f64>,
    pub pe: Option<f64>,
}

/// Single batched call covering every candidate code, so filtering a page
/// of recommendations costs one upstream round trip, not one per row.
pub async fn fetch_stock_metadata(substrate: &dyn UpstreamSubstrate, provider: &str, codes: &[String]) -> HashMap<String, StockMetadata> {
    if codes.is_empty() {
        return HashMap::new();
    }
    let mut args = serde_json::Map::new();
    args.insert("codes".to_string(), json!(codes.join(",")));

    let Ok(table) = substrate.call(provider, "stock_daily_basic", args, CALL_DEADLINE).await else {
        return HashMap::new();
    };

    let Some(idx_code) = table.column_index("code") else { return HashMap::new() };
    let idx_name = table.column_index("name");
    let idx_industry = table.column_index("industry");
    let idx_cap = table.resolve_column(&["total_mv"], &[]).or_else(|| table.resolve_column(&["market", "cap"], &[]));
    let idx_liquidity = table.resolve_column(&["turnover"], &[]).or_else(|| table.column_index("vol"));
    let idx_pe = table.resolve_column(&["pe"], &["percentile"]);

    let mut out = HashMap::new();
    for row in &table.rows {
        let Some(code) = row.get(idx_code).and_then(to_str) else { continue };
        let meta = StockMetadata {
            name: idx_name.and_then(|i| row.get(i)).and_then(to_str),
            industry: idx_industry.and_then(|i| row.get(i)).and_then(to_str),
            market_cap: idx_cap.and_then(|i| row.get(i)).and_then(to_float),
            liquidity: idx_liquidity.and_then(|i| row.get(i)).and_then(to_float),
            pe: idx_pe.and_then(|i| row.get(i)).and_then(to_float),
        };
        out.insert(code, meta);
    }
    out
}
