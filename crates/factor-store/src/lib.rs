pub mod cache;
pub mod store;

pub use store::FactorStore;

use factor_core::{FundFactorRow, InstrumentKind, StockFactorRow, TradeDate};

/// A stored factor row of either instrument kind. The store is generic over
/// `kind` at the API boundary (§4.2); internally each kind has its own table.
#[derive(Debug, Clone)]
pub enum FactorRow {
    Stock(StockFactorRow),
    Fund(FundFactorRow),
}

impl FactorRow {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            FactorRow::Stock(_) => InstrumentKind::Stock,
            FactorRow::Fund(_) => InstrumentKind::Fund,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            FactorRow::Stock(r) => &r.code,
            FactorRow::Fund(r) => &r.code,
        }
    }

    pub fn trade_date(&self) -> TradeDate {
        match self {
            FactorRow::Stock(r) => r.trade_date,
            FactorRow::Fund(r) => r.trade_date,
        }
    }

    /// Value of a named score field (`short_term_score` / `long_term_score`).
    pub fn score(&self, field: &str) -> Option<f64> {
        match self {
            FactorRow::Stock(r) => match field {
                "short_term_score" => r.short_term_score,
                "long_term_score" => r.long_term_score,
                _ => None,
            },
            FactorRow::Fund(r) => match field {
                "short_term_score" => r.short_term_score,
                "long_term_score" => r.long_term_score,
                _ => None,
            },
        }
    }

    pub fn as_stock(&self) -> Option<&StockFactorRow> {
        match self {
            FactorRow::Stock(r) => Some(r),
            FactorRow::Fund(_) => None,
        }
    }

    pub fn as_fund(&self) -> Option<&FundFactorRow> {
        match self {
            FactorRow::Fund(r) => Some(r),
            FactorRow::Stock(_) => None,
        }
    }
}
