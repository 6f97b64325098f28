pub mod fund_alpha;
pub mod fund_momentum;
pub mod stock_long_term;
pub mod stock_short_term;
pub mod tiers;
pub mod weighting;

pub use fund_alpha::FundAlphaScorer;
pub use fund_momentum::FundMomentumScorer;
pub use stock_long_term::LongTermStockScorer;
pub use stock_short_term::ShortTermStockScorer;
