use std::time::Duration;

use serde_json::json;

use factor_core::coerce::to_str;
use factor_core::{FundUniverse, UpstreamSubstrate};

const CALL_DEADLINE: Duration = Duration::from_secs(10);

/// §4.5 step 3: "stocks = all listed codes". Excludes delisted names via
/// `list_status`.
pub async fn list_stock_codes(substrate: &dyn UpstreamSubstrate, provider: &str) -> Vec<String> {
    let args = serde_json::Map::new();
    let Ok(table) = substrate.call(provider, "stock_basic", args, CALL_DEADLINE).await else {
        return Vec::new();
    };
    let Some(idx_code) = table.column_index("code") else { return Vec::new() };
    let idx_status = table.column_index("list_status");

    table
        .rows
        .iter()
        .filter(|row| {
            idx_status
                .and_then(|i| row.get(i))
                .and_then(to_str)
                .map(|s| s == "L" || s.eq_ignore_ascii_case("listed"))
                .unwrap_or(true)
        })
        .filter_map(|row| row.get(idx_code).and_then(to_str))
        .collect()
}

/// §4.5 step 3: "funds = configurable universe in {tracked, market,
/// market_otc, market_etf}".
pub async fn list_fund_codes(substrate: &dyn UpstreamSubstrate, provider: &str, universe: FundUniverse) -> Vec<String> {
    let universe_arg = match universe {
        FundUniverse::Tracked => "tracked",
        FundUniverse::Market => "market",
        FundUniverse::MarketOtc => "market_otc",
        FundUniverse::MarketEtf => "market_etf",
    };
    let mut args = serde_json::Map::new();
    args.insert("universe".to_string(), json!(universe_arg));

    let Ok(table) = substrate.call(provider, "fund_basic", args, CALL_DEADLINE).await else {
        return Vec::new();
    };
    let Some(idx_code) = table.column_index("code") else { return Vec::new() };
    table.rows.iter().filter_map(|row| row.get(idx_code).and_then(to_str)).collect()
}

/// §4.5 step 2: resolve `trade_date`, falling back to today's calendar date
/// if the upstream "latest trade date" call is unavailable.
pub async fn resolve_trade_date(substrate: &dyn UpstreamSubstrate, provider: &str) -> factor_core::TradeDate {
    let args = serde_json::Map::new();
    if let Ok(table) = substrate.call(provider, "latest_trade_date", args, CALL_DEADLINE).await {
        if let Some(idx) = table.column_index("trade_date") {
            if let Some(date_str) = table.rows.first().and_then(|r| r.get(idx)).and_then(to_str) {
                if let Some(date) = factor_core::TradeDate::parse_yyyymmdd(&date_str).or_else(|| factor_core::TradeDate::parse_storage(&date_str)) {
                    return date;
                }
            }
        }
    }
    factor_core::TradeDate::from_naive(chrono::Utc::now().date_naive())
}
