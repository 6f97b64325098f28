use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar, the common shape factor computers consume from upstream history calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Calendar date of a Chinese exchange trading session. Treated as an opaque
/// ordered key; the core never invents trade dates, it only parses and formats them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeDate(NaiveDate);

impl TradeDate {
    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse the wire format `YYYYMMDD`.
    pub fn parse_yyyymmdd(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(Self)
    }

    /// Parse the storage format `YYYY-MM-DD`.
    pub fn parse_storage(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Self)
    }

    pub fn to_wire(self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    pub fn to_storage(self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn naive(self) -> NaiveDate {
        self.0
    }

    /// `n` trade-days forward via a five-weekday approximation. No trading-day
    /// calendar is wired into the core (see the spec's open question on this);
    /// this is the documented stand-in used by the Performance Tracker.
    pub fn plus_trade_days(self, n: i64) -> Self {
        let mut date = self.0;
        let mut remaining = n;
        while remaining > 0 {
            date = date.succ_opt().unwrap_or(date);
            if !matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
                remaining -= 1;
            }
        }
        Self(date)
    }

    /// Number of (weekday-approximated) trade-days between `earlier` and `self`.
    pub fn trade_days_since(self, earlier: TradeDate) -> i64 {
        let mut count = 0i64;
        let mut date = earlier.0;
        while date < self.0 {
            date = date.succ_opt().unwrap_or(date);
            if !matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
                count += 1;
            }
        }
        count
    }
}

/// Two instrument kinds tracked by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Stock,
    Fund,
}

/// Stock code: 6-digit string; canonical form carries an exchange suffix.
/// Conversion between plain and canonical form is total and round-trip lossless.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockCode(String);

impl StockCode {
    pub fn from_plain(code: &str) -> Option<Self> {
        if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(code.to_string()))
        } else {
            None
        }
    }

    pub fn from_canonical(code: &str) -> Option<Self> {
        let plain = code.split('.').next().unwrap_or(code);
        Self::from_plain(plain)
    }

    pub fn plain(&self) -> &str {
        &self.0
    }

    pub fn canonical(&self) -> String {
        let suffix = match self.0.as_bytes()[0] {
            b'6' => ".SH",
            b'4' | b'8' => ".BJ",
            _ => ".SZ",
        };
        format!("{}{suffix}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundMarker {
    Of,
    Etf,
}

/// Fund code: 6-digit string; canonical form carries an `.OF`/`.ETF` marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundCode {
    plain: String,
    marker: FundMarker,
}

impl FundCode {
    pub fn new(plain: &str, marker: FundMarker) -> Option<Self> {
        if plain.len() == 6 && plain.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self { plain: plain.to_string(), marker })
        } else {
            None
        }
    }

    pub fn from_canonical(code: &str) -> Option<Self> {
        if let Some(plain) = code.strip_suffix(".OF") {
            return Self::new(plain, FundMarker::Of);
        }
        if let Some(plain) = code.strip_suffix(".ETF") {
            return Self::new(plain, FundMarker::Etf);
        }
        None
    }

    pub fn canonical(&self) -> String {
        match self.marker {
            FundMarker::Of => format!("{}.OF", self.plain),
            FundMarker::Etf => format!("{}.ETF", self.plain),
        }
    }

    pub fn plain(&self) -> &str {
        &self.plain
    }

    pub fn marker(&self) -> FundMarker {
        self.marker
    }
}

/// Which fund universe the Daily Computer should enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundUniverse {
    Tracked,
    Market,
    MarketOtc,
    MarketEtf,
}

impl FundUniverse {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tracked" => Some(Self::Tracked),
            "market" => Some(Self::Market),
            "market_otc" => Some(Self::MarketOtc),
            "market_etf" => Some(Self::MarketEtf),
            _ => None,
        }
    }
}

macro_rules! nullable_fields {
    ($name:ident { $($field:ident),* $(,)? }) => {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct $name {
            pub code: String,
            pub trade_date: TradeDate,
            $(pub $field: Option<f64>,)*
            pub computed_at: DateTime<Utc>,
        }

        impl $name {
            pub fn empty(code: impl Into<String>, trade_date: TradeDate) -> Self {
                Self {
                    code: code.into(),
                    trade_date,
                    $($field: None,)*
                    computed_at: Utc::now(),
                }
            }

            /// Copy every `Some` field from `other` over this row's fields.
            /// Used to merge the partial rows produced by independent factor
            /// computers (technical/fundamental/sentiment, or performance/risk/manager).
            pub fn merge_from(&mut self, other: &Self) {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            }
        }
    };
}

nullable_fields!(StockFactorRow {
    consolidation_score,
    volume_precursor,
    ma_convergence,
    rsi,
    macd_signal,
    bollinger_position,
    roe,
    roe_yoy,
    gross_margin,
    gross_margin_stability,
    ocf_to_profit,
    debt_ratio,
    revenue_growth_yoy,
    profit_growth_yoy,
    revenue_cagr_3y,
    profit_cagr_3y,
    peg_ratio,
    pe_percentile,
    pb_percentile,
    main_inflow_5d,
    main_inflow_trend,
    north_inflow_5d,
    retail_outflow_ratio,
    short_term_score,
    long_term_score,
});

nullable_fields!(FundFactorRow {
    return_1w,
    return_1m,
    return_3m,
    return_6m,
    return_1y,
    return_1y_rank,
    volatility_20d,
    volatility_60d,
    sharpe_20d,
    sharpe_1y,
    sortino_1y,
    calmar_1y,
    max_drawdown_1y,
    avg_recovery_days,
    manager_tenure_years,
    manager_alpha_bull,
    manager_alpha_bear,
    style_consistency,
    fund_size,
    holdings_avg_roe,
    diversification,
    turnover_rate,
    short_term_score,
    long_term_score,
});

/// `rec_type` discriminator for a recorded recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecType {
    ShortStock,
    LongStock,
    ShortFund,
    LongFund,
}

impl RecType {
    pub fn kind(self) -> InstrumentKind {
        match self {
            RecType::ShortStock | RecType::LongStock => InstrumentKind::Stock,
            RecType::ShortFund | RecType::LongFund => InstrumentKind::Fund,
        }
    }

    pub fn score_field(self) -> &'static str {
        match self {
            RecType::ShortStock | RecType::ShortFund => "short_term_score",
            RecType::LongStock | RecType::LongFund => "long_term_score",
        }
    }

    /// `(target_return_pct, stop_loss_pct)` per §4.6.
    pub fn target_and_stop(self) -> (f64, f64) {
        match self {
            RecType::ShortStock => (5.0, -3.0),
            RecType::LongStock => (10.0, -5.0),
            RecType::ShortFund => (3.0, -2.0),
            RecType::LongFund => (8.0, -4.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecType::ShortStock => "short_stock",
            RecType::LongStock => "long_stock",
            RecType::ShortFund => "short_fund",
            RecType::LongFund => "long_fund",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Evaluated7d,
    Evaluated30d,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    /// `high >= 75`, `medium >= 60`, else `low` (§4.6).
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            ConfidenceBucket::High
        } else if score >= 60.0 {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }
}

/// A recorded recommendation. Created once by the Recommendation Engine;
/// forward fields are owned and updated only by the Performance Tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub code: String,
    pub rec_type: RecType,
    pub rec_date: TradeDate,
    pub rec_price: f64,
    pub rec_score: f64,
    pub target_return_pct: f64,
    pub stop_loss_pct: f64,
    pub price_7d: Option<f64>,
    pub return_7d: Option<f64>,
    pub price_30d: Option<f64>,
    pub return_30d: Option<f64>,
    pub hit_target: Option<bool>,
    pub hit_stop: Option<bool>,
    pub final_return: Option<f64>,
    pub evaluation_status: EvaluationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn new(code: impl Into<String>, rec_type: RecType, rec_date: TradeDate, rec_price: f64, rec_score: f64) -> Self {
        let (target_return_pct, stop_loss_pct) = rec_type.target_and_stop();
        let now = Utc::now();
        Self {
            code: code.into(),
            rec_type,
            rec_date,
            rec_price,
            rec_score,
            target_return_pct,
            stop_loss_pct,
            price_7d: None,
            return_7d: None,
            price_30d: None,
            return_30d: None,
            hit_target: None,
            hit_stop: None,
            final_return: None,
            evaluation_status: EvaluationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A cell in an upstream provider's tabular response. Upstream rows arrive
/// loosely-typed; every value funnels through `coerce::to_float` / `coerce::to_str`
/// before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Float(f64),
    Text(String),
}

/// A provider's raw tabular response: named columns, rows of scalar/string cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// §9 column resolver: match a column whose name contains every string in
    /// `must_contain` and none of `must_not_contain`. Upstream endpoints stamp
    /// dates into column names (e.g. `'2026-01-30-估算数据-估算值'`).
    pub fn resolve_column(&self, must_contain: &[&str], must_not_contain: &[&str]) -> Option<usize> {
        self.columns.iter().position(|c| {
            must_contain.iter().all(|s| c.contains(s)) && must_not_contain.iter().all(|s| !c.contains(s))
        })
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }
}

/// Provider call-site observability snapshot (§4.1 `stats`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStats {
    pub provider: String,
    pub tier: String,
    pub effective_limit: u32,
    pub calls_in_window: u32,
    pub utilization: f64,
    pub breaker_state: BreakerState,
}

/// Daily Computer progress snapshot (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub current_batch: usize,
    pub status: RunStatus,
}

impl Default for Progress {
    fn default() -> Self {
        Self { total: 0, completed: 0, failed: 0, current_batch: 0, status: RunStatus::Idle }
    }
}

/// Shared cooperative-cancellation signal (§4.5, §5): a worker checks this
/// before each upstream call and stops short of persisting that instrument
/// once it is set. Cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
