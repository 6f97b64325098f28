use std::time::Duration;

use serde_json::json;

use factor_core::coerce::to_float;
use factor_core::{InstrumentKind, TradeDate, UpstreamSubstrate};

const CALL_DEADLINE: Duration = Duration::from_secs(10);

/// Latest close (stock) or NAV (fund) on or before `trade_date`. Used both
/// for `rec_price` at recommendation time and for the 7d/30d evaluation
/// passes — same call shape, just a different `trade_date`.
pub async fn fetch_close(substrate: &dyn UpstreamSubstrate, provider: &str, kind: InstrumentKind, code: &str, trade_date: TradeDate) -> Option<f64> {
    let mut args = serde_json::Map::new();
    args.insert("code".to_string(), json!(code));
    args.insert("end_date".to_string(), json!(trade_date.to_wire()));
    args.insert("limit".to_string(), json!(1));

    let (endpoint, column) = match kind {
        InstrumentKind::Stock => ("stock_daily_ohlcv", "close"),
        InstrumentKind::Fund => ("fund_nav_history", "nav"),
    };

    let table = substrate.call(provider, endpoint, args, CALL_DEADLINE).await.ok()?;
    let idx = table.column_index(column)?;
    table.rows.first().and_then(|row| row.get(idx)).and_then(to_float)
}
