pub mod computer;
pub mod ratios;

pub use computer::FundamentalFactorComputer;
