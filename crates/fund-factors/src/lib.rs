pub mod computer;
pub mod risk;

pub use computer::FundPerformanceComputer;
