pub mod estimator;
pub mod etf_linkage;
pub mod quote;

pub use estimator::{ValuationEstimate, ValuationEstimator, ValuationMethod};
