pub mod price;
pub mod stats;
pub mod store;

pub use stats::Aggregation;
pub use store::PerformanceTracker;
